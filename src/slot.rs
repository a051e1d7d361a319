// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Adapter from a camera's request-completed signal to a Rust handler.
//!
//! A [`RequestCompleteSlot`] owns a handler and its context. While the slot is
//! alive the handler runs once for every completed request, on the thread
//! that emitted the completion. Dropping the slot unsubscribes; once `drop`
//! returns the handler will not run again and the context has been released
//! (or, when dropped from inside the handler, is released as soon as that
//! handler returns).

use std::{
    cell::RefCell,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::ReentrantMutex;
use tracing::{debug, trace};

use crate::{
    backend::{NativeConnection, NativeRequest},
    camera::Camera,
    error::Result,
    request::CompletedRequest,
};

type Handler<C> = Box<dyn Fn(&C, &CompletedRequest<'_>) + Send + Sync>;

struct Subscriber<C> {
    handler: Handler<C>,
    context: C,
}

/// Serialises deliveries against unsubscription.
///
/// The lock is reentrant so that a handler may drop its own slot; the
/// `RefCell` borrow held by the running delivery then keeps the subscriber
/// in place until the delivery unwinds.
struct Gate<C> {
    subscriber: ReentrantMutex<RefCell<Option<Subscriber<C>>>>,
    closed: AtomicBool,
}

impl<C> Gate<C> {
    fn deliver(&self, request: &dyn NativeRequest) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let guard = self.subscriber.lock();
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let subscriber = guard.borrow();
        if let Some(subscriber) = subscriber.as_ref() {
            (subscriber.handler)(&subscriber.context, &CompletedRequest::new(request));
        }
    }

    /// Closes the gate and takes the subscriber, unless a delivery on this
    /// thread is still using it.
    fn close(&self) -> Option<Subscriber<C>> {
        self.closed.store(true, Ordering::Release);
        let guard = self.subscriber.lock();
        let mut slot = guard.try_borrow_mut().ok()?;
        slot.take()
    }
}

/// Subscription to a camera's completed requests.
///
/// # Example
///
/// ```no_run
/// # use libcamera_bridge::{CameraManager, RequestCompleteSlot};
/// # use std::sync::atomic::{AtomicUsize, Ordering};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = CameraManager::new()?;
/// let camera = manager.cameras().into_iter().next().ok_or("no camera")?;
///
/// let slot = RequestCompleteSlot::connect(
///     &camera,
///     |count: &AtomicUsize, request| {
///         count.fetch_add(1, Ordering::Relaxed);
///         println!("{}", request);
///     },
///     AtomicUsize::new(0),
/// )?;
///
/// // ... queue requests ...
///
/// drop(slot); // no further deliveries after this returns
/// # Ok(())
/// # }
/// ```
pub struct RequestCompleteSlot<C: Send + Sync + 'static> {
    gate: Arc<Gate<C>>,
    connection: Option<Box<dyn NativeConnection>>,
    camera: Camera,
}

impl<C: Send + Sync + 'static> RequestCompleteSlot<C> {
    /// Connects `handler` to the completion signal of `camera`.
    ///
    /// On failure nothing remains registered and `context` has been dropped.
    /// Handler panics propagate to the emitting thread.
    pub fn connect<F>(camera: &Camera, handler: F, context: C) -> Result<Self>
    where
        F: Fn(&C, &CompletedRequest<'_>) + Send + Sync + 'static,
    {
        let gate = Arc::new(Gate {
            subscriber: ReentrantMutex::new(RefCell::new(Some(Subscriber {
                handler: Box::new(handler),
                context,
            }))),
            closed: AtomicBool::new(false),
        });

        let delivery = gate.clone();
        let connection = camera
            .native()
            .connect_request_completed(Box::new(move |request: &dyn NativeRequest| {
                delivery.deliver(request)
            }))?;
        debug!(camera = %camera.id(), "connected request completed handler");

        Ok(Self {
            gate,
            connection: Some(connection),
            camera: camera.clone(),
        })
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }
}

impl<C: Send + Sync + 'static> Drop for RequestCompleteSlot<C> {
    fn drop(&mut self) {
        let subscriber = self.gate.close();
        self.connection.take();
        if subscriber.is_none() {
            trace!("slot dropped from its own handler");
        }
        drop(subscriber);
        debug!(camera = %self.camera.id(), "disconnected request completed handler");
    }
}

impl<C: Send + Sync + 'static> fmt::Debug for RequestCompleteSlot<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCompleteSlot")
            .field("camera", &self.camera.id())
            .field("closed", &self.gate.closed.load(Ordering::Relaxed))
            .finish()
    }
}
