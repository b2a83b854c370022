//! The VM lifecycle and co-simulation loop: cold boot, resume from
//! hibernation, the main instruction-batch loop, and the five terminal
//! conditions the interpreter can return.

use crate::backing_store::BackingStore;
use crate::bridge::{CsrBridge, RAM_IMAGE_OFFSET};
use crate::bus::Bus;
use crate::cache::Cache;
use crate::config::{
    BLK_FILENAME, DTB_FILENAME, DTB_SIZE, EMULATOR_FIXED_UPDATE, EMULATOR_TIME_DIV,
    INSTRS_PER_FLIP, INSTRS_PER_FLIP_SINGLE_STEP, KERNEL_CMDLINE, KERNEL_FILENAME, RAM_AMT,
    SNAPSHOT_FILENAME, STAT_FILENAME, STORAGE_MOUNT_RETRY_DELAY_MS,
};
use crate::dtb;
use crate::error::HostError;
use crate::hal::{Console, Platform, Storage};
use crate::interpreter::{Interpreter, StepOutcome};
use crate::power_state::PowerState;
use crate::storage;
use core::convert::Infallible;
use log::info;

/// Runtime toggles that are per-run decisions rather than hardware
/// facts, and so live outside [`crate::config`] (see the configuration
/// design note).
#[derive(Clone, Copy, Debug)]
pub struct RunOptions {
    /// Derive elapsed guest time from the cycle counter instead of a
    /// wall-clock source.
    pub fixed_update: bool,
    /// Actually sleep while the guest is idling in `WFI`.
    pub do_sleep: bool,
    /// Run one instruction per batch instead of [`INSTRS_PER_FLIP`].
    pub single_step: bool,
    /// Abort the batch loop on any guest fault rather than passing it
    /// through to the guest's own trap vector.
    pub fail_on_all_faults: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fixed_update: EMULATOR_FIXED_UPDATE,
            do_sleep: true,
            single_step: false,
            fail_on_all_faults: false,
        }
    }
}

/// Error type shared by every fallible [`Vm`] operation.
pub type VmError<Blk> = HostError<Infallible, <Blk as Storage>::Error>;

/// Owns every singleton the reference firmware keeps as module-level
/// mutable state: the cache, the backing-store and storage
/// collaborators, the console, the power/timing platform, the
/// interpreter, and (while running) the CSR bridge.
pub struct Vm<I, Store, Blk: Storage, Con, Plat> {
    cache: Cache,
    store: Store,
    interpreter: I,
    blk_storage: Blk,
    console: Con,
    platform: Plat,
    bridge: Option<CsrBridge<Blk>>,
    options: RunOptions,
    last_time: u64,
}

impl<I, Store, Blk, Con, Plat> Vm<I, Store, Blk, Con, Plat>
where
    I: Interpreter,
    Store: BackingStore,
    Blk: Storage,
    Con: Console,
    Plat: Platform,
{
    /// Assembles a VM from its collaborators. `blk_storage` must already
    /// be mounted (see [`mount_storage`]).
    pub fn new(
        interpreter: I,
        store: Store,
        blk_storage: Blk,
        console: Con,
        platform: Plat,
        options: RunOptions,
    ) -> Self {
        Self {
            cache: Cache::new(),
            store,
            interpreter,
            blk_storage,
            console,
            platform,
            bridge: None,
            options,
            last_time: 0,
        }
    }

    /// Runs one VM session to a terminal state, starting from `hint`.
    ///
    /// Waits for the power button before booting unless `hint` is
    /// [`PowerState::Reboot`]. If `hint` is [`PowerState::GetSd`], the
    /// persisted power-state registry decides whether to cold-boot or
    /// resume from a hibernation snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if image loading, snapshot I/O, or power-state
    /// persistence fails.
    pub fn start(&mut self, hint: PowerState) -> Result<PowerState, VmError<Blk>> {
        if hint != PowerState::Reboot {
            while !self.platform.power_button_pressed() {}
        }
        self.cache.reset();

        let prior_state = if hint == PowerState::GetSd {
            storage::read_power_state_byte(&mut self.blk_storage, STAT_FILENAME)
                .map(PowerState::from_byte)
                .unwrap_or(PowerState::Unknown)
        } else {
            hint
        };

        if prior_state == PowerState::Hibernate {
            info!("resuming from snapshot");
            self.resume()?;
        } else {
            info!("cold booting");
            self.cold_boot()?;
        }

        storage::write_power_state_byte(
            &mut self.blk_storage,
            STAT_FILENAME,
            PowerState::Running.to_byte(),
        )?;

        let mut blk_file = self
            .blk_storage
            .open(BLK_FILENAME, false)
            .map_err(HostError::Storage)?;
        let blk_size = self
            .blk_storage
            .size(&mut blk_file)
            .map_err(HostError::Storage)?;
        self.bridge = Some(CsrBridge::new(blk_size, blk_file));

        if !self.options.fixed_update {
            self.last_time = self.platform.micros() / EMULATOR_TIME_DIV;
        }

        let terminal = self.run_loop()?;
        storage::write_power_state_byte(&mut self.blk_storage, STAT_FILENAME, terminal.to_byte())?;
        Ok(terminal)
    }

    fn cold_boot(&mut self) -> Result<(), VmError<Blk>> {
        storage::load_file_into_ram(
            &mut self.blk_storage,
            KERNEL_FILENAME,
            0,
            RAM_AMT as u32,
            &mut self.store,
        )?;

        let dtb_base = RAM_AMT as u32 - DTB_SIZE as u32;
        storage::load_file_into_ram(
            &mut self.blk_storage,
            DTB_FILENAME,
            dtb_base,
            DTB_SIZE as u32,
            &mut self.store,
        )?;
        dtb::patch(&mut self.store, dtb_base, KERNEL_CMDLINE)?;

        self.interpreter.enter_machine_mode();
        self.interpreter.set_reg(10, 0);
        self.interpreter
            .set_reg(11, dtb_base.wrapping_add(RAM_IMAGE_OFFSET));
        self.interpreter.set_pc(RAM_IMAGE_OFFSET);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), VmError<Blk>> {
        storage::load_snapshot(
            &mut self.blk_storage,
            SNAPSHOT_FILENAME,
            RAM_AMT as u32,
            self.interpreter.state_mut().as_mut(),
            &mut self.store,
        )
    }

    fn hibernate(&mut self) -> Result<PowerState, VmError<Blk>> {
        info!("hibernating");
        self.cache.flush(&mut self.store);
        storage::save_snapshot(
            &mut self.blk_storage,
            SNAPSHOT_FILENAME,
            RAM_AMT as u32,
            self.interpreter.state().as_ref(),
            &mut self.store,
        )?;
        Ok(PowerState::Hibernate)
    }

    fn elapsed_us(&mut self) -> u64 {
        let now = if self.options.fixed_update {
            self.interpreter.cycle_counter()
        } else {
            self.platform.micros()
        } / EMULATOR_TIME_DIV;
        let elapsed = now.saturating_sub(self.last_time);
        self.last_time = now;
        elapsed
    }

    fn run_loop(&mut self) -> Result<PowerState, VmError<Blk>> {
        let mut bridge = self
            .bridge
            .take()
            .expect("bridge is populated by start() before run_loop()");
        let instrs = if self.options.single_step {
            INSTRS_PER_FLIP_SINGLE_STEP
        } else {
            INSTRS_PER_FLIP
        };

        let terminal = loop {
            let elapsed_us = self.elapsed_us();
            let code = {
                let mut bus = Bus {
                    cache: &mut self.cache,
                    store: &mut self.store,
                    bridge: &mut bridge,
                    blk_storage: &mut self.blk_storage,
                    console: &mut self.console,
                    fail_on_all_faults: self.options.fail_on_all_faults,
                };
                self.interpreter.run_batch(&mut bus, instrs, elapsed_us)
            };

            match StepOutcome::from_code(code) {
                StepOutcome::Normal => {}
                StepOutcome::Idle => {
                    if self.options.do_sleep {
                        self.platform.sleep_ms(1);
                    }
                    self.interpreter.advance_cycle_counter(instrs as u64);
                }
                StepOutcome::Fault => {
                    // "Terminate loop; treat as normal return" per the
                    // lifecycle design note: no distinct persisted state,
                    // the caller's final write in `start()` covers it.
                    break PowerState::Unknown;
                }
                StepOutcome::Reboot => {
                    storage::write_power_state_byte(
                        &mut self.blk_storage,
                        STAT_FILENAME,
                        PowerState::Reboot.to_byte(),
                    )?;
                    break PowerState::Reboot;
                }
                StepOutcome::PowerOff => {
                    storage::write_power_state_byte(
                        &mut self.blk_storage,
                        STAT_FILENAME,
                        PowerState::PowerOff.to_byte(),
                    )?;
                    break PowerState::PowerOff;
                }
                StepOutcome::Unknown(code) => {
                    log::warn!("unknown interpreter return code {code:#x}");
                    storage::write_power_state_byte(
                        &mut self.blk_storage,
                        STAT_FILENAME,
                        PowerState::Unknown.to_byte(),
                    )?;
                    break PowerState::Unknown;
                }
            }

            if bridge.take_hibernate_request() {
                storage::write_power_state_byte(
                    &mut self.blk_storage,
                    STAT_FILENAME,
                    PowerState::Hibernate.to_byte(),
                )?;
                self.bridge = Some(bridge);
                return self.hibernate();
            }
        };

        self.bridge = Some(bridge);
        Ok(terminal)
    }
}

/// Mounts `blk_storage`, retrying per
/// [`crate::config::STORAGE_MOUNT_RETRIES`]. Lives outside [`Vm`] because
/// it runs before the interpreter, console, and platform collaborators
/// exist.
///
/// # Errors
///
/// Returns the last mount error if every attempt fails.
pub fn mount_storage<S: Storage>(
    blk_storage: &mut S,
    sleep_ms: impl FnMut(u32),
) -> Result<(), HostError<Infallible, S::Error>> {
    storage::mount(blk_storage, sleep_ms, STORAGE_MOUNT_RETRY_DELAY_MS)
}
