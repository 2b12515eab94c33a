//! AArch64 exclusive-access and event-wait instructions.
//!
//! Only compiled on aarch64. Elsewhere [`Capabilities`](crate::Capabilities)
//! never selects the exclusive backend or event waiting.

#![allow(unsafe_code)]

use core::arch::asm;

/// Load-exclusive of a 64-bit word, arming this core's exclusive monitor.
///
/// # Safety
///
/// `ptr` must be valid for reads and 8-byte aligned.
#[inline(always)]
pub(crate) unsafe fn load_exclusive_u64(ptr: *const u64, acquire: bool) -> u64 {
    let value: u64;
    if acquire {
        asm!(
            "ldaxr {value}, [{ptr}]",
            ptr = in(reg) ptr,
            value = out(reg) value,
            options(nostack, preserves_flags)
        );
    } else {
        asm!(
            "ldxr {value}, [{ptr}]",
            ptr = in(reg) ptr,
            value = out(reg) value,
            options(nostack, preserves_flags)
        );
    }
    value
}

/// Store-exclusive of a 64-bit word. Returns `true` if the store took effect.
///
/// Fails whenever the monitor armed by the matching load was cleared.
///
/// # Safety
///
/// `ptr` must be valid for writes and 8-byte aligned.
#[inline(always)]
pub(crate) unsafe fn store_exclusive_u64(ptr: *mut u64, value: u64, release: bool) -> bool {
    let status: u32;
    if release {
        asm!(
            "stlxr {status:w}, {value}, [{ptr}]",
            status = out(reg) status,
            value = in(reg) value,
            ptr = in(reg) ptr,
            options(nostack, preserves_flags)
        );
    } else {
        asm!(
            "stxr {status:w}, {value}, [{ptr}]",
            status = out(reg) status,
            value = in(reg) value,
            ptr = in(reg) ptr,
            options(nostack, preserves_flags)
        );
    }
    status == 0
}

/// Arm the monitor on a 32-bit word and return its current value.
///
/// # Safety
///
/// `ptr` must be valid for reads and 4-byte aligned.
#[inline(always)]
pub(crate) unsafe fn monitor_u32(ptr: *const u32) -> u32 {
    let value: u32;
    asm!(
        "ldaxr {value:w}, [{ptr}]",
        ptr = in(reg) ptr,
        value = out(reg) value,
        options(nostack, preserves_flags)
    );
    value
}

/// Arm the monitor on a 64-bit word and return its current value.
///
/// # Safety
///
/// `ptr` must be valid for reads and 8-byte aligned.
#[inline(always)]
pub(crate) unsafe fn monitor_u64(ptr: *const u64) -> u64 {
    load_exclusive_u64(ptr, true)
}

/// Sleep until an event arrives, such as a store clearing the armed monitor.
#[inline(always)]
pub(crate) fn wait_for_event() {
    // SAFETY: wfe has no memory or register side effects.
    unsafe {
        asm!("wfe", options(nomem, nostack, preserves_flags));
    }
}

/// Drop any reservation held by this core.
#[inline(always)]
pub(crate) fn clear_exclusive() {
    // SAFETY: clrex only resets the local monitor.
    unsafe {
        asm!("clrex", options(nomem, nostack, preserves_flags));
    }
}
