// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exclusive, reentrant access to the shared bus.
//!
//! All bus traffic of the process goes through a single [`Arbiter`] that is
//! created at startup and shared by reference (e.g. in an `Arc`). A thread
//! opens a session with [`Arbiter::begin`] or [`Arbiter::session`]. Sessions
//! of the same thread nest: only the outermost one powers up the line,
//! initializes the master and lowers the log verbosity, and only its end
//! reverts all of that. Other threads wait up to a bounded time for the
//! session to end.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use log::LevelFilter;
use parking_lot::{Condvar, Mutex};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::master::Master;
use crate::transport::Transport;

/// When the master is initialized and closed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitPolicy {
    /// Initialize at the start of every outermost session and
    /// deinitialize at its end.
    #[default]
    PerSession,
    /// Initialize once and keep the master open.
    KeepAlive,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub policy: InitPolicy,
    /// Maximum log verbosity while a session is open.
    pub silence_level: LevelFilter,
    /// How long [`Arbiter::session`] callers wait for the bus by default.
    pub max_wait_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            policy: InitPolicy::PerSession,
            silence_level: LevelFilter::Warn,
            max_wait_ms: 500,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Board specific steps around a session.
///
/// Typical implementations switch the RS-485 transceiver supply or
/// termination.
pub trait BusHooks: Send {
    /// Called before the first transaction of an outermost session.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drain pending output. Called at the end of an outermost session.
    fn flush(&mut self) {}

    /// Put the line to rest. Called after [`BusHooks::flush`] and when
    /// [`BusHooks::prepare`] failed.
    fn idle(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Access to the log verbosity lowered during sessions.
pub trait LogLevel: Send + Sync {
    fn level(&self) -> LevelFilter;
    fn set_level(&self, level: LevelFilter);
}

/// The global maximum level of the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalLogLevel;

impl LogLevel for GlobalLogLevel {
    fn level(&self) -> LevelFilter {
        log::max_level()
    }

    fn set_level(&self, level: LevelFilter) {
        log::set_max_level(level);
    }
}

#[derive(Debug, Default)]
struct Window {
    owner: Option<ThreadId>,
    depth: usize,
}

struct Bus<T> {
    master: Master<T>,
    hooks: Option<Box<dyn BusHooks>>,
    restore_level: Option<LevelFilter>,
}

/// Owner of the [`Master`] that serializes all access to it.
pub struct Arbiter<T> {
    config: SessionConfig,
    window: Mutex<Window>,
    released: Condvar,
    depth: AtomicUsize,
    bus: Mutex<Bus<T>>,
    log_level: Box<dyn LogLevel>,
}

impl<T> fmt::Debug for Arbiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arbiter")
            .field("config", &self.config)
            .field("depth", &self.depth.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Arbiter<T> {
    pub fn new(master: Master<T>, config: SessionConfig) -> Self {
        Self {
            config,
            window: Mutex::new(Window::default()),
            released: Condvar::new(),
            depth: AtomicUsize::new(0),
            bus: Mutex::new(Bus {
                master,
                hooks: None,
                restore_level: None,
            }),
            log_level: Box::new(GlobalLogLevel),
        }
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: impl BusHooks + 'static) -> Self {
        self.bus.get_mut().hooks = Some(Box::new(hooks));
        self
    }

    /// Replace the controlled log level, [`GlobalLogLevel`] by default.
    #[must_use]
    pub fn with_log_level(mut self, log_level: impl LogLevel + 'static) -> Self {
        self.log_level = Box::new(log_level);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// `true` while any thread holds a session.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.depth() > 0
    }

    /// Nesting depth of the current session.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Enter a session, waiting at most `max_wait` for another thread's
    /// session to end.
    ///
    /// Every successful call must be paired with [`Arbiter::end`] on the
    /// same thread. On failure nothing has to be undone.
    pub fn begin(&self, max_wait: Duration) -> Result<()> {
        let me = thread::current().id();
        // `None` if the wait is too long to be represented: wait forever.
        let deadline = Instant::now().checked_add(max_wait);
        let mut window = self.window.lock();
        loop {
            match window.owner {
                None => {
                    window.owner = Some(me);
                    break;
                }
                Some(owner) if owner == me => break,
                Some(_) => match deadline {
                    Some(deadline) => {
                        if self
                            .released
                            .wait_until(&mut window, deadline)
                            .timed_out()
                            && window.owner.is_some()
                        {
                            log::warn!("Timed out waiting {max_wait:?} for the bus");
                            return Err(Error::Timeout);
                        }
                    }
                    None => self.released.wait(&mut window),
                },
            }
        }
        if window.depth == 0 {
            // The window is owned, so the lock can be released while the
            // line is set up.
            drop(window);
            if let Err(err) = self.setup() {
                self.window.lock().owner = None;
                self.released.notify_one();
                return Err(err);
            }
            window = self.window.lock();
        }
        window.depth += 1;
        self.depth.store(window.depth, Ordering::Release);
        Ok(())
    }

    /// Leave a session entered with [`Arbiter::begin`].
    ///
    /// Ending the outermost session flushes and idles the line, closes the
    /// master unless it is kept alive and restores the log level. Calls
    /// without a matching `begin` on this thread are ignored.
    pub fn end(&self) {
        let me = thread::current().id();
        let mut window = self.window.lock();
        if window.owner != Some(me) || window.depth == 0 {
            drop(window);
            log::warn!("Ignoring end of a bus session that was never begun");
            return;
        }
        window.depth -= 1;
        self.depth.store(window.depth, Ordering::Release);
        if window.depth > 0 {
            return;
        }
        drop(window);
        self.teardown();
        self.window.lock().owner = None;
        self.released.notify_one();
    }

    /// Enter a session that ends when the returned guard is dropped.
    pub fn session(&self, max_wait: Duration) -> Result<Session<'_, T>> {
        self.begin(max_wait)?;
        Ok(Session {
            arbiter: self,
            _thread_bound: PhantomData,
        })
    }

    /// Run `f` with the master inside a session of its own.
    pub fn with_session<R>(
        &self,
        max_wait: Duration,
        f: impl FnOnce(&mut Master<T>) -> Result<R>,
    ) -> Result<R> {
        self.session(max_wait)?.master(f)
    }

    /// Run `f` with the master.
    ///
    /// The calling thread must hold a session. Fails with [`Error::Busy`]
    /// if `f` would be nested into another call of this method.
    pub fn with_master<R>(&self, f: impl FnOnce(&mut Master<T>) -> Result<R>) -> Result<R> {
        {
            let window = self.window.lock();
            if window.owner != Some(thread::current().id()) || window.depth == 0 {
                return Err(Error::NoSession);
            }
        }
        let mut bus = self.bus.try_lock().ok_or(Error::Busy)?;
        f(&mut bus.master)
    }

    fn setup(&self) -> Result<()> {
        let mut guard = self.bus.lock();
        let bus = &mut *guard;
        let previous = self.log_level.level();
        self.log_level
            .set_level(previous.min(self.config.silence_level));
        let fresh = match self.config.policy {
            InitPolicy::KeepAlive if bus.master.is_initialized() => false,
            _ => {
                if let Err(err) = bus.master.init() {
                    log::error!("Failed to initialize the bus master: {err}");
                    self.log_level.set_level(previous);
                    return Err(err);
                }
                true
            }
        };
        if let Some(hooks) = bus.hooks.as_mut() {
            if let Err(err) = hooks.prepare() {
                log::error!("Failed to prepare the bus: {err}");
                if let Err(err) = hooks.idle() {
                    log::warn!("Failed to idle the bus: {err}");
                }
                if fresh {
                    if let Err(err) = bus.master.deinit() {
                        log::warn!("Failed to deinitialize the bus master: {err}");
                    }
                }
                self.log_level.set_level(previous);
                return Err(err);
            }
        }
        bus.restore_level = Some(previous);
        Ok(())
    }

    fn teardown(&self) {
        let mut guard = self.bus.lock();
        let bus = &mut *guard;
        if let Some(hooks) = bus.hooks.as_mut() {
            hooks.flush();
            if let Err(err) = hooks.idle() {
                log::warn!("Failed to idle the bus: {err}");
            }
        }
        if self.config.policy == InitPolicy::PerSession {
            if let Err(err) = bus.master.deinit() {
                log::warn!("Failed to deinitialize the bus master: {err}");
            }
        }
        if let Some(level) = bus.restore_level.take() {
            self.log_level.set_level(level);
        }
    }
}

/// An open session, ended on drop.
///
/// The guard is bound to the thread that opened it.
#[derive(Debug)]
pub struct Session<'a, T: Transport> {
    arbiter: &'a Arbiter<T>,
    _thread_bound: PhantomData<*const ()>,
}

impl<T: Transport> Session<'_, T> {
    /// See [`Arbiter::with_master`].
    pub fn master<R>(&self, f: impl FnOnce(&mut Master<T>) -> Result<R>) -> Result<R> {
        self.arbiter.with_master(f)
    }
}

impl<T: Transport> Drop for Session<'_, T> {
    fn drop(&mut self) {
        self.arbiter.end();
    }
}
