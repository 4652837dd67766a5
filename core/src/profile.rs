//! Process-wide sampling profiler.
//!
//! While enabled, a ticker thread raises a flag at a fixed wall-clock
//! interval; the VM's dispatch loop notices it and appends the current
//! call-stack snapshot to the output writer in a compact binary format
//! (magic, version, period, then one length-prefixed record per sample).

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::error::EvalError;
use crate::eval::Thread;
use crate::vm::snapshot_frames;

pub const PROFILE_MAGIC: [u8; 4] = *b"BPRF";
pub const PROFILE_VERSION: u16 = 1;

const SAMPLE_PERIOD: Duration = Duration::from_millis(10);

static ACTIVE: AtomicBool = AtomicBool::new(false);
static SAMPLE_DUE: AtomicBool = AtomicBool::new(false);

struct ProfilerState {
    out: Box<dyn Write + Send>,
    samples: u64,
}

static STATE: Lazy<Mutex<Option<ProfilerState>>> = Lazy::new(|| Mutex::new(None));

/// Begin profiling. Starting twice without an intervening stop is an error.
pub fn start_profile(out: Box<dyn Write + Send>) -> Result<(), EvalError> {
    let mut state = STATE.lock().unwrap_or_else(|e| e.into_inner());
    if state.is_some() {
        return Err(EvalError::other("profiler already started"));
    }
    let mut out = out;
    let mut header = Vec::with_capacity(16);
    header.extend_from_slice(&PROFILE_MAGIC);
    header.extend_from_slice(&PROFILE_VERSION.to_le_bytes());
    header.extend_from_slice(&(SAMPLE_PERIOD.as_micros() as u32).to_le_bytes());
    out.write_all(&header)
        .map_err(|e| EvalError::other(format!("profiler: {}", e)))?;
    *state = Some(ProfilerState { out, samples: 0 });
    ACTIVE.store(true, Ordering::Release);
    thread::spawn(|| {
        while ACTIVE.load(Ordering::Acquire) {
            thread::sleep(SAMPLE_PERIOD);
            SAMPLE_DUE.store(true, Ordering::Release);
        }
    });
    Ok(())
}

/// Stop profiling and flush the writer. Stopping when not started is an
/// error.
pub fn stop_profile() -> Result<(), EvalError> {
    ACTIVE.store(false, Ordering::Release);
    let mut state = STATE.lock().unwrap_or_else(|e| e.into_inner());
    let Some(mut s) = state.take() else {
        return Err(EvalError::other("profiler is not started"));
    };
    let mut footer = Vec::with_capacity(12);
    footer.extend_from_slice(&u32::MAX.to_le_bytes()); // end-of-samples marker
    footer.extend_from_slice(&s.samples.to_le_bytes());
    s.out
        .write_all(&footer)
        .and_then(|_| s.out.flush())
        .map_err(|e| EvalError::other(format!("profiler: {}", e)))?;
    Ok(())
}

/// Polled from the VM dispatch loop; nearly free when disabled.
pub(crate) fn maybe_sample(thread: &Thread) {
    if !ACTIVE.load(Ordering::Relaxed) {
        return;
    }
    if !SAMPLE_DUE.swap(false, Ordering::AcqRel) {
        return;
    }
    let frames = snapshot_frames(thread);
    let mut record = Vec::new();
    record.extend_from_slice(&(frames.len() as u32).to_le_bytes());
    for fr in &frames {
        write_str(&mut record, &fr.name);
        match &fr.pos {
            Some(p) => {
                write_str(&mut record, &p.filename);
                record.extend_from_slice(&p.line.to_le_bytes());
                record.extend_from_slice(&p.col.to_le_bytes());
            }
            None => {
                write_str(&mut record, "");
                record.extend_from_slice(&0u32.to_le_bytes());
                record.extend_from_slice(&0u32.to_le_bytes());
            }
        }
    }
    let mut state = STATE.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(s) = state.as_mut() {
        if s.out.write_all(&record).is_ok() {
            s.samples += 1;
        }
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop_guarding() {
        // Serialized by the global state itself: run both checks in one
        // test to avoid interleaving with a concurrently running pair.
        let buf: Vec<u8> = Vec::new();
        start_profile(Box::new(buf)).expect("first start");
        let second = start_profile(Box::new(Vec::new()));
        assert!(second.is_err());
        assert!(second.unwrap_err().to_string().contains("already started"));
        stop_profile().expect("stop");
        let again = stop_profile();
        assert!(again.is_err());
        assert!(again.unwrap_err().to_string().contains("not started"));
    }
}
