//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Caller-supplied event sinks for calls.

use crate::status::Status;
use std::fmt;

type NextFn<T> = Box<dyn Fn(T) + Send + Sync>;
type StatusFn = Box<dyn Fn(Status) + Send + Sync>;

/// Receives the events of one call.
///
/// An observer gets any number of `on_next` events followed by at most one
/// terminal event, either `on_completed` or `on_error`. Handlers that are not
/// set ignore their events.
///
/// Handlers run on the thread that processes the packet, outside of any
/// client lock, so they may start or cancel other calls.
///
/// # Example
///
/// ```rust
/// use pwrpc::{Status, StreamObserver};
/// use std::sync::{Arc, Mutex};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let observer = StreamObserver::new()
///     .with_next(move |value: u32| sink.lock().unwrap().push(value))
///     .with_completed(|status| assert_eq!(status, Status::Ok));
///
/// observer.on_next(5);
/// observer.on_completed(Status::Ok);
/// assert_eq!(*seen.lock().unwrap(), vec![5]);
/// ```
pub struct StreamObserver<T> {
    on_next: NextFn<T>,
    on_completed: StatusFn,
    on_error: StatusFn,
}

impl<T> StreamObserver<T> {
    /// Creates an observer that ignores every event.
    #[must_use]
    pub fn new() -> Self {
        Self {
            on_next: Box::new(|_| {}),
            on_completed: Box::new(|_| {}),
            on_error: Box::new(|_| {}),
        }
    }

    /// Sets the handler for response messages.
    #[must_use]
    pub fn with_next(mut self, handler: impl Fn(T) + Send + Sync + 'static) -> Self {
        self.on_next = Box::new(handler);
        self
    }

    /// Sets the handler for successful or status-carrying completion.
    #[must_use]
    pub fn with_completed(mut self, handler: impl Fn(Status) + Send + Sync + 'static) -> Self {
        self.on_completed = Box::new(handler);
        self
    }

    /// Sets the handler for a server error.
    #[must_use]
    pub fn with_error(mut self, handler: impl Fn(Status) + Send + Sync + 'static) -> Self {
        self.on_error = Box::new(handler);
        self
    }

    /// Delivers a response message.
    pub fn on_next(&self, value: T) {
        (self.on_next)(value);
    }

    /// Delivers the completion status.
    pub fn on_completed(&self, status: Status) {
        (self.on_completed)(status);
    }

    /// Delivers an error status.
    pub fn on_error(&self, status: Status) {
        (self.on_error)(status);
    }
}

impl<T> Default for StreamObserver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for StreamObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamObserver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_default_ignores_events() {
        let observer = StreamObserver::<String>::default();
        observer.on_next("ignored".to_string());
        observer.on_completed(Status::Ok);
        observer.on_error(Status::Internal);
    }

    #[test]
    fn test_handlers_receive_events() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (next, done, failed) = (Arc::clone(&log), Arc::clone(&log), Arc::clone(&log));
        let observer = StreamObserver::new()
            .with_next(move |value: i32| next.lock().unwrap().push(format!("next {value}")))
            .with_completed(move |status| done.lock().unwrap().push(format!("done {status}")))
            .with_error(move |status| failed.lock().unwrap().push(format!("error {status}")));

        observer.on_next(1);
        observer.on_next(2);
        observer.on_completed(Status::Ok);
        observer.on_error(Status::Aborted);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["next 1", "next 2", "done OK", "error ABORTED"]
        );
    }
}
