//! Failure injection for the crate's disk seams. Tests arm a site to fail
//! its next N hits on the current thread; the armed count is consumed as the
//! failures fire, so a site disarms itself. `BASALT_FAILPOINTS` (a comma
//! separated list of site names) forces sites to fail unconditionally, for
//! driving error paths from outside the process.

use std::cell::Cell;
use std::io;

/// Sites where an injected failure can be raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    PagerRead,
    PagerWrite,
}

const SITE_COUNT: usize = 2;

impl FailPoint {
    fn index(self) -> usize {
        match self {
            FailPoint::PagerRead => 0,
            FailPoint::PagerWrite => 1,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FailPoint::PagerRead => "pager_read",
            FailPoint::PagerWrite => "pager_write",
        }
    }
}

thread_local! {
    /// Remaining armed failures per site; zero means disarmed.
    static ARMED: Cell<[u32; SITE_COUNT]> = const { Cell::new([0; SITE_COUNT]) };
}

/// Arms the site to fail its next `count` hits on this thread.
pub fn arm(point: FailPoint, count: u32) {
    ARMED.with(|armed| {
        let mut counts = armed.get();
        counts[point.index()] = count;
        armed.set(counts);
    });
}

pub fn disarm(point: FailPoint) {
    arm(point, 0);
}

/// Disarms every site on this thread.
pub fn reset() {
    ARMED.with(|armed| armed.set([0; SITE_COUNT]));
}

fn forced_by_env(point: FailPoint) -> bool {
    std::env::var("BASALT_FAILPOINTS")
        .map(|raw| raw.split(',').any(|name| name.trim() == point.name()))
        .unwrap_or(false)
}

/// Called at the instrumented site: raises an injected error while the site
/// is armed (consuming one hit) or forced through the environment.
pub fn hit(point: FailPoint) -> io::Result<()> {
    let armed_now = ARMED.with(|armed| {
        let mut counts = armed.get();
        if counts[point.index()] == 0 {
            return false;
        }
        counts[point.index()] -= 1;
        armed.set(counts);
        true
    });
    if armed_now || forced_by_env(point) {
        return Err(io::Error::other(format!(
            "injected failure at {}",
            point.name()
        )));
    }
    Ok(())
}
