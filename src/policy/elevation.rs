//! Process privilege probe backing the elevation check.
//!
//! `None` means the probe is inapplicable on this platform; the applier
//! treats that as elevated. That permissive default is a development
//! convenience for non-primary platforms, not a security boundary; hosts
//! that need a real check on such platforms should install their own probe
//! via [`PolicyApplier::with_elevation_probe`].
//!
//! [`PolicyApplier::with_elevation_probe`]: crate::policy::PolicyApplier::with_elevation_probe

pub type ElevationProbe = fn() -> Option<bool>;

#[cfg(unix)]
#[must_use]
pub fn process_is_elevated() -> Option<bool> {
    // SAFETY: geteuid takes no arguments and cannot fail.
    Some(unsafe { libc::geteuid() } == 0)
}

#[cfg(not(unix))]
#[must_use]
pub fn process_is_elevated() -> Option<bool> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn probe_is_applicable_on_unix() {
        assert!(process_is_elevated().is_some());
    }
}
