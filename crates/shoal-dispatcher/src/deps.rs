use chrono::{DateTime, Utc};

use crate::error::DispatchError;

/// Wall-clock source, pluggable so tests can fix `WORKFLOW_STARTED_AT`
/// (spec.md §9 design note: the dispatcher is "polymorphic over the
/// capability set {Run, Now, Build, a minimal BMC set}").
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Runs an external program and reports whether it exited successfully.
/// The one place the dispatcher shells out: device wait, mount, and
/// `systemctl start` all go through this so tests never invoke a real
/// process.
pub trait Exec: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> Result<bool, DispatchError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExec;

impl Exec for SystemExec {
    fn run(&self, program: &str, args: &[&str]) -> Result<bool, DispatchError> {
        let status = std::process::Command::new(program)
            .args(args)
            .status()
            .map_err(|e| DispatchError::Unexpected(format!("spawning {program}: {e}")))?;
        Ok(status.success())
    }
}

/// The two host-local serial number sources in the fallback chain
/// (spec.md §4.7 step 4), kept separate from `Exec` since one is a file
/// read and the other a subprocess call with a fixed argument.
pub trait SerialSource: Send + Sync {
    fn product_serial(&self) -> Option<String>;
    fn dmidecode_serial(&self) -> Option<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerialSource;

impl SerialSource for SystemSerialSource {
    fn product_serial(&self) -> Option<String> {
        std::fs::read_to_string("/sys/class/dmi/id/product_serial")
            .ok()
            .map(|s| s.trim().to_string())
    }

    fn dmidecode_serial(&self) -> Option<String> {
        let output = std::process::Command::new("dmidecode")
            .args(["-s", "system-serial-number"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8(output.stdout).ok().map(|s| s.trim().to_string())
    }
}

/// The dispatcher's pluggable capability set, bundled so `run()` takes one
/// argument instead of four. Production code builds this from the
/// `System*` implementations; tests substitute fakes.
pub struct Dependencies {
    pub clock: Box<dyn Clock>,
    pub exec: Box<dyn Exec>,
    pub serial_source: Box<dyn SerialSource>,
}

impl Dependencies {
    pub fn system() -> Self {
        Dependencies {
            clock: Box::new(SystemClock),
            exec: Box::new(SystemExec),
            serial_source: Box::new(SystemSerialSource),
        }
    }
}
