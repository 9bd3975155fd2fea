//! Host metrics recorded next to measurements

/// Number of logical processors available to this process
pub fn available_processors() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// One-minute system load average, never negative
///
/// Platforms without a load average report 0.
pub fn load_average() -> f64 {
    sample_load_average().filter(|l| l.is_finite()).unwrap_or(0.0).max(0.0)
}

#[cfg(unix)]
fn sample_load_average() -> Option<f64> {
    let mut loads = [0f64; 3];
    // SAFETY: the buffer holds 3 elements and we request 1.
    let n = unsafe { libc::getloadavg(loads.as_mut_ptr(), 1) };
    (n >= 1).then_some(loads[0])
}

#[cfg(not(unix))]
fn sample_load_average() -> Option<f64> {
    None
}
