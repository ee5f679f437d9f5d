mod lifecycle;
mod manifest;
mod poller;

pub use self::lifecycle::*;
pub use self::manifest::*;
pub use self::poller::*;

/// An occurrence worth reporting to the operator: one structured log record
/// plus the matching metric updates.
pub trait InternalEvent: Sized {
    fn emit(self);
}

pub fn emit(event: impl InternalEvent) {
    event.emit();
}

#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::internal_events::emit($event)
    };
}
