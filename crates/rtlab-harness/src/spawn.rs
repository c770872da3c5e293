//! OS thread creation.
//!
//! `std::thread` cannot attach a scheduling policy at creation time, so RT
//! threads go through `pthread_create` with explicit scheduling attributes:
//! the new thread starts life under SCHED_FIFO/SCHED_RR and never executes a
//! single instruction under the inherited policy. NRT threads use a plain
//! `std::thread::Builder`.

use rtlab_common::config::SchedPolicy;
use std::io;
use std::marker::PhantomData;
use std::thread::{self, JoinHandle};

/// Handle to a running thread, RT or NRT.
pub(crate) enum OsThread<T> {
    /// Created through raw pthread attributes.
    Posix(PosixThread<T>),
    /// Created through `std::thread`.
    Std(JoinHandle<T>),
}

impl<T> OsThread<T> {
    /// Block until the thread returns.
    ///
    /// The outer error is a failed join; the inner one a panic in the body.
    pub(crate) fn join(self) -> io::Result<thread::Result<T>> {
        match self {
            Self::Posix(handle) => handle.join(),
            Self::Std(handle) => Ok(handle.join()),
        }
    }
}

/// Spawn a default-scheduled thread.
pub(crate) fn spawn_nrt<F, T>(name: String, body: F) -> io::Result<OsThread<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name)
        .spawn(body)
        .map(OsThread::Std)
}

/// Spawn a thread that starts under `policy` at `priority`.
///
/// Fails with the OS error from `pthread_create`, typically `EPERM` when the
/// process lacks CAP_SYS_NICE or RLIMIT_RTPRIO.
#[cfg(target_os = "linux")]
pub(crate) fn spawn_rt<F, T>(policy: SchedPolicy, priority: u8, body: F) -> io::Result<OsThread<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    posix::spawn(policy, priority, Box::new(body)).map(OsThread::Posix)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn spawn_rt<F, T>(policy: SchedPolicy, priority: u8, _body: F) -> io::Result<OsThread<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{policy} priority {priority} not available on this platform"),
    ))
}

/// Joinable pthread whose body returns `T`.
pub(crate) struct PosixThread<T> {
    raw: libc::pthread_t,
    joined: bool,
    _result: PhantomData<T>,
}

#[cfg(target_os = "linux")]
impl<T> PosixThread<T> {
    fn join(mut self) -> io::Result<thread::Result<T>> {
        let mut ret: *mut libc::c_void = std::ptr::null_mut();
        // SAFETY: raw came from a successful pthread_create and is joined once
        cvt(unsafe { libc::pthread_join(self.raw, &mut ret) })?;
        self.joined = true;
        // SAFETY: the trampoline always returns a leaked Box<thread::Result<T>>
        let result = unsafe { Box::from_raw(ret.cast::<thread::Result<T>>()) };
        Ok(*result)
    }
}

#[cfg(not(target_os = "linux"))]
impl<T> PosixThread<T> {
    fn join(self) -> io::Result<thread::Result<T>> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

impl<T> Drop for PosixThread<T> {
    fn drop(&mut self) {
        if !self.joined {
            // Dropped without join: let the thread clean up after itself.
            // SAFETY: raw is a joinable thread that nobody else will join
            unsafe {
                libc::pthread_detach(self.raw);
            }
        }
    }
}

/// Turn a pthread return code into an `io::Result`.
fn cvt(rc: libc::c_int) -> io::Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(rc))
    }
}

#[cfg(target_os = "linux")]
mod posix {
    use super::{cvt, PosixThread};
    use crate::realtime::raw_policy;
    use rtlab_common::config::SchedPolicy;
    use std::io;
    use std::marker::PhantomData;
    use std::mem::MaybeUninit;
    use std::panic::{self, AssertUnwindSafe};
    use std::thread;

    type Body<T> = Box<dyn FnOnce() -> T + Send>;

    /// Initialized `pthread_attr_t`, destroyed on drop.
    struct SchedAttr(libc::pthread_attr_t);

    impl SchedAttr {
        fn new(policy: SchedPolicy, priority: u8) -> io::Result<Self> {
            let mut raw = MaybeUninit::<libc::pthread_attr_t>::uninit();
            // SAFETY: pthread_attr_init initializes the pointed-to attribute
            cvt(unsafe { libc::pthread_attr_init(raw.as_mut_ptr()) })?;
            // SAFETY: initialized by the call above
            let mut attr = Self(unsafe { raw.assume_init() });

            let param = libc::sched_param {
                sched_priority: i32::from(priority),
            };

            // SAFETY: attr.0 is initialized; param outlives the call
            unsafe {
                cvt(libc::pthread_attr_setinheritsched(
                    &mut attr.0,
                    libc::PTHREAD_EXPLICIT_SCHED,
                ))?;
                cvt(libc::pthread_attr_setschedpolicy(&mut attr.0, raw_policy(policy)))?;
                cvt(libc::pthread_attr_setschedparam(&mut attr.0, &param))?;
            }

            Ok(attr)
        }
    }

    impl Drop for SchedAttr {
        fn drop(&mut self) {
            // SAFETY: self.0 was initialized by pthread_attr_init
            unsafe {
                libc::pthread_attr_destroy(&mut self.0);
            }
        }
    }

    pub(super) fn spawn<T: Send + 'static>(
        policy: SchedPolicy,
        priority: u8,
        body: Body<T>,
    ) -> io::Result<PosixThread<T>> {
        let attr = SchedAttr::new(policy, priority)?;
        let arg = Box::into_raw(Box::new(body));
        let mut raw = MaybeUninit::<libc::pthread_t>::uninit();

        // SAFETY: attr is initialized; trampoline::<T> takes ownership of arg
        // exactly once, and only if pthread_create succeeds
        let rc = unsafe {
            libc::pthread_create(raw.as_mut_ptr(), &attr.0, trampoline::<T>, arg.cast())
        };

        if rc != 0 {
            // SAFETY: the thread was not created, so arg is still ours
            drop(unsafe { Box::from_raw(arg) });
            return Err(io::Error::from_raw_os_error(rc));
        }

        Ok(PosixThread {
            // SAFETY: pthread_create succeeded and wrote the handle
            raw: unsafe { raw.assume_init() },
            joined: false,
            _result: PhantomData,
        })
    }

    extern "C" fn trampoline<T: Send + 'static>(arg: *mut libc::c_void) -> *mut libc::c_void {
        // SAFETY: arg is the Box<Body<T>> leaked by spawn
        let body = unsafe { Box::from_raw(arg.cast::<Body<T>>()) };
        // Unwinding across the extern "C" boundary would abort
        let result: thread::Result<T> = panic::catch_unwind(AssertUnwindSafe(*body));
        Box::into_raw(Box::new(result)).cast()
    }
}
