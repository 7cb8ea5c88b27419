//! Process-wide frame and scratch-buffer pools.
//!
//! Entries are fully reset on release, so an acquired value is always in
//! its default state. The pools live for the lifetime of the process.

use std::sync::Mutex;

use super::Frame;

// enough for bursts of concurrent producers without hoarding memory.
const POOL_CAP: usize = 128;

static FRAME_POOL: Mutex<Vec<Frame>> = Mutex::new(Vec::new());

static BUF_POOL: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());

/// Get a [`Frame`] from the pool, in its default state.
pub fn acquire_frame() -> Frame {
    FRAME_POOL
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .pop()
        .unwrap_or_default()
}

/// Reset `fr` and return it to the pool.
pub fn release_frame(mut fr: Frame) {
    fr.reset();
    let mut pool = FRAME_POOL.lock().unwrap_or_else(|e| e.into_inner());
    if pool.len() < POOL_CAP {
        pool.push(fr);
    }
}

/// Get an empty scratch buffer from the pool.
pub fn acquire_buf() -> Vec<u8> {
    BUF_POOL
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .pop()
        .unwrap_or_default()
}

/// Clear `buf` and return it to the pool, keeping its allocation.
pub fn release_buf(mut buf: Vec<u8>) {
    buf.clear();
    let mut pool = BUF_POOL.lock().unwrap_or_else(|e| e.into_inner());
    if pool.len() < POOL_CAP {
        pool.push(buf);
    }
}
