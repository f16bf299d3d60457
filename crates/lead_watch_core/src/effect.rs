use std::time::Duration;

use crate::{NewRecordBatch, NotifyMethod};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Fetch,
    InvokeAuthHook,
    Deliver {
        batch: NewRecordBatch,
        method: NotifyMethod,
    },
    /// Wait `delay` (interruptibly), then report `Msg::TimerFired`.
    ScheduleFetch { delay: Duration },
}

impl Effect {
    pub fn schedule(delay: Duration) -> Self {
        Effect::ScheduleFetch { delay }
    }
}
