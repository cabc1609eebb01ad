//! A dual-channel soldering station control library.
//!
//! Hardware-independent core of the station firmware: tool
//! identification, temperature measurement, mains-synchronized
//! temperature control and settings persistence. Board crates implement
//! [`board::Board`] for their peripherals and drive a
//! [`control::Control`] instance from their interrupt handlers.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

#[cfg(test)]
extern crate std;

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod board;
pub mod channel;
pub mod control;
pub mod measurement;
pub mod settings;
pub mod tip;
pub mod tool;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// A control core shared between interrupt handlers and tasks.
///
/// Locked with a critical section, so every `Control::on_*` entry point
/// runs to completion before the next one starts.
pub type SharedControl<B> = Mutex<CriticalSectionRawMutex, RefCell<control::Control<B>>>;
