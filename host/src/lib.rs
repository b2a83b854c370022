#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), no_std)]
#![warn(
    // groups: https://doc.rust-lang.org/rustc/lints/groups.html
    future_incompatible,
    let_underscore,
    nonstandard_style,
    rust_2018_compatibility,
    rust_2018_idioms,
    rust_2021_compatibility,
    unused,

    // warnings that are not enabled by default or covered by groups
    // https://doc.rust-lang.org/rustc/lints/listing/allowed-by-default.html
    macro_use_extern_crate,
    meta_variable_misuse,
    missing_abi,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    non_ascii_idents,
    noop_method_call,
    single_use_lifetimes,
    trivial_numeric_casts,
    unreachable_pub,
    unsafe_op_in_unsafe_fn,
    unused_import_braces,
    unused_lifetimes,
    unused_qualifications,
    unused_results,

    // https://github.com/rust-lang/rust-clippy/blob/master/README.md
    clippy::pedantic,
    clippy::cargo,

    // https://doc.rust-lang.org/rustdoc/lints.html
    rustdoc::missing_crate_level_docs,
    rustdoc::private_doc_tests,
    rustdoc::invalid_html_tags,
)]
#![allow(clippy::cast_possible_truncation, clippy::multiple_crate_versions)]

//! A host for a RISC-V IMA guest whose memory lives in external serial
//! PSRAM behind a two-way set-associative write-back cache. See the
//! individual modules for the cache, the backing-store driver, the
//! guest/host CSR bridge, and the VM lifecycle loop.

pub mod backing_store;
pub mod bridge;
pub mod bus;
pub mod cache;
pub mod config;
pub mod dtb;
pub mod error;
pub mod hal;
pub mod interpreter;
pub mod logger;
pub mod power_state;
pub mod storage;
pub mod vm;

pub use power_state::PowerState;
pub use vm::{mount_storage, RunOptions, Vm, VmError};
