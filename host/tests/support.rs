//! Fakes shared by the integration tests: an in-memory backing store, a
//! RAM-resident "storage medium" keyed by file name, a loopback console,
//! a platform with a controllable power button, and a minimal
//! interpreter whose "instructions" are just CSR pokes driven by the
//! test itself.

#![allow(dead_code)]

use rv32ima_host::backing_store::BackingStore;
use rv32ima_host::hal::{Console, Platform, Storage};
use rv32ima_host::interpreter::{Interpreter, MemoryBus};
use std::boxed::Box;
use std::collections::HashMap;
use std::convert::Infallible;
use std::string::ToString;
use std::vec::Vec;

pub struct FakeBackingStore {
    pub ram: Vec<u8>,
}

impl FakeBackingStore {
    pub fn new(size: usize) -> Self {
        Self { ram: std::vec![0u8; size] }
    }
}

impl BackingStore for FakeBackingStore {
    fn read(&mut self, addr: u32, buf: &mut [u8]) {
        let addr = addr as usize;
        buf.copy_from_slice(&self.ram[addr..addr + buf.len()]);
    }

    fn write(&mut self, addr: u32, buf: &[u8]) {
        let addr = addr as usize;
        self.ram[addr..addr + buf.len()].copy_from_slice(buf);
    }
}

#[derive(Default, Clone)]
pub struct FakeFile {
    name: &'static str,
    pos: usize,
}

#[derive(Default)]
pub struct FakeStorage {
    files: HashMap<&'static str, Vec<u8>>,
    mounted: bool,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&mut self, name: &'static str, contents: Vec<u8>) {
        let _ = self.files.insert(name, contents);
    }

    pub fn contents(&self, name: &'static str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }
}

impl Storage for FakeStorage {
    type Error = Infallible;
    type File = FakeFile;

    fn mount(&mut self) -> Result<(), Self::Error> {
        self.mounted = true;
        Ok(())
    }

    fn open(&mut self, name: &str, _create: bool) -> Result<Self::File, Self::Error> {
        let name: &'static str = Box::leak(name.to_string().into_boxed_str());
        let _ = self.files.entry(name).or_default();
        Ok(FakeFile { name, pos: 0 })
    }

    fn size(&mut self, file: &mut Self::File) -> Result<u64, Self::Error> {
        Ok(self.files.get(file.name).map_or(0, Vec::len) as u64)
    }

    fn seek(&mut self, file: &mut Self::File, offset: u64) -> Result<(), Self::Error> {
        file.pos = offset as usize;
        Ok(())
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let data = self.files.entry(file.name).or_default();
        let available = data.len().saturating_sub(file.pos);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&data[file.pos..file.pos + n]);
        file.pos += n;
        Ok(n)
    }

    fn write(&mut self, file: &mut Self::File, buf: &[u8]) -> Result<(), Self::Error> {
        let data = self.files.entry(file.name).or_default();
        let end = file.pos + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[file.pos..end].copy_from_slice(buf);
        file.pos = end;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeConsole {
    pub input: std::collections::VecDeque<u8>,
    pub output: Vec<u8>,
}

impl Console for FakeConsole {
    fn has_input(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn read_byte(&mut self) -> u8 {
        self.input.pop_front().unwrap_or(0)
    }

    fn write_byte(&mut self, byte: u8) {
        self.output.push(byte);
    }
}

pub struct FakePlatform {
    pub button_presses_remaining: u32,
    pub micros: u64,
}

impl FakePlatform {
    pub fn pressed_immediately() -> Self {
        Self {
            button_presses_remaining: 0,
            micros: 0,
        }
    }
}

impl Platform for FakePlatform {
    fn power_button_pressed(&mut self) -> bool {
        if self.button_presses_remaining == 0 {
            true
        } else {
            self.button_presses_remaining -= 1;
            false
        }
    }

    fn micros(&mut self) -> u64 {
        self.micros += 1;
        self.micros
    }

    fn sleep_ms(&mut self, _ms: u32) {}
}

/// A trivial interpreter: state is a fixed byte array, registers are a
/// plain array, and `run_batch` just returns whatever code the test
/// preloaded via [`FakeInterpreter::next_code`]. Good enough to drive
/// the VM loop's dispatch logic without a real RISC-V core.
pub struct FakeInterpreter {
    pub regs: [u32; 32],
    pub pc: u32,
    pub cycle: u64,
    pub state: [u8; 16],
    pub next_code: u32,
    pub batches_run: u32,
}

impl Default for FakeInterpreter {
    fn default() -> Self {
        Self {
            regs: [0; 32],
            pc: 0,
            cycle: 0,
            state: [0; 16],
            next_code: 0,
            batches_run: 0,
        }
    }
}

impl Interpreter for FakeInterpreter {
    type State = [u8; 16];

    fn state(&self) -> &Self::State {
        &self.state
    }

    fn state_mut(&mut self) -> &mut Self::State {
        &mut self.state
    }

    fn set_reg(&mut self, reg: usize, value: u32) {
        self.regs[reg] = value;
    }

    fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    fn cycle_counter(&self) -> u64 {
        self.cycle
    }

    fn advance_cycle_counter(&mut self, n: u64) {
        self.cycle += n;
    }

    fn enter_machine_mode(&mut self) {}

    fn run_batch<B: MemoryBus>(&mut self, _bus: &mut B, _instrs: usize, _elapsed_us: u64) -> u32 {
        self.batches_run += 1;
        self.next_code
    }
}
