//! Wall clock seam

use std::rc::Rc;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Timestamp;

/// Source of the current time in epoch milliseconds.
pub trait Clock {
    fn now_ms(&self) -> Timestamp;
}

/// The host's system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
            Err(_) => 0,
        }
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> Timestamp {
        (**self).now_ms()
    }
}

impl<T: Clock + ?Sized> Clock for Rc<T> {
    fn now_ms(&self) -> Timestamp {
        (**self).now_ms()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now_ms(&self) -> Timestamp {
        (**self).now_ms()
    }
}
