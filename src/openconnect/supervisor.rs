//! Run the VPN client with the prelogin cookie on its stdin
//!
//! SIGTERM sent to us while the client runs is forwarded to the client so it
//! can log out of the gateway. The ordering matters:
//!
//! 1. block SIGTERM in this thread
//! 2. spawn the client, restoring the original mask in the child
//! 3. install the forwarding handler
//! 4. unblock SIGTERM
//!
//! A SIGTERM arriving between 2 and 4 stays pending and is delivered to the
//! handler at step 4 instead of killing us with the client still running.
//!
//! The process must be single threaded while this runs, otherwise another
//! thread can take the signal with the default disposition.

use std::io::{self, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Signal setup failed: {0}")]
    Signal(#[source] io::Error),
    #[error("Failed to start VPN client: {0}")]
    Spawn(#[source] io::Error),
    #[error("Failed to pass cookie to VPN client: {0}")]
    Stdin(#[source] io::Error),
    #[error("Failed to wait for VPN client: {0}")]
    Wait(#[source] io::Error),
}

#[cfg(unix)]
pub use unix::{SignalMask, TerminateForwarder};

#[cfg(unix)]
mod unix {
    use nix::sys::signal::{
        SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal, kill, sigaction,
    };
    use nix::unistd::Pid;
    use std::ffi::c_int;
    use std::sync::atomic::{AtomicI32, Ordering};

    /// Pid SIGTERM is forwarded to, 0 when no client runs
    static CHILD_PID: AtomicI32 = AtomicI32::new(0);

    extern "C" fn forward_terminate(_signal: c_int) {
        let pid = CHILD_PID.load(Ordering::SeqCst);
        if pid > 0 {
            let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
        }
    }

    /// Changes this thread's signal mask; the previous mask comes back on drop
    pub struct SignalMask {
        previous: SigSet,
    }

    impl SignalMask {
        /// Add `signal` to the blocked set
        pub fn block(signal: Signal) -> nix::Result<Self> {
            let mut set = SigSet::empty();
            set.add(signal);
            let previous = set.thread_swap_mask(SigmaskHow::SIG_BLOCK)?;
            Ok(Self { previous })
        }

        /// Replace the mask with `mask`
        pub fn set(mask: &SigSet) -> nix::Result<Self> {
            let previous = mask.thread_swap_mask(SigmaskHow::SIG_SETMASK)?;
            Ok(Self { previous })
        }

        pub fn previous(&self) -> &SigSet {
            &self.previous
        }
    }

    impl Drop for SignalMask {
        fn drop(&mut self) {
            let _ = self.previous.thread_set_mask();
        }
    }

    /// SIGTERM handler that relays the signal to one child
    ///
    /// Dropping restores the previous SIGTERM disposition.
    pub struct TerminateForwarder {
        previous: SigAction,
    }

    impl TerminateForwarder {
        pub fn install(child_pid: u32) -> nix::Result<Self> {
            CHILD_PID.store(child_pid as i32, Ordering::SeqCst);
            let action = SigAction::new(
                SigHandler::Handler(forward_terminate),
                SaFlags::SA_RESTART,
                SigSet::empty(),
            );
            // SAFETY: the handler only does an atomic load and kill(2)
            let previous = unsafe { sigaction(Signal::SIGTERM, &action) }?;
            Ok(Self { previous })
        }
    }

    impl Drop for TerminateForwarder {
        fn drop(&mut self) {
            // SAFETY: reinstates the disposition we replaced
            let _ = unsafe { sigaction(Signal::SIGTERM, &self.previous) };
            CHILD_PID.store(0, Ordering::SeqCst);
        }
    }
}

/// Spawn `command`, write `secret` to its stdin, close it, and wait for exit
#[cfg(unix)]
pub fn run_with_secret(command: Command, secret: &[u8]) -> Result<ExitStatus, SupervisorError> {
    run_with_secret_after_spawn(command, secret, |_| {})
}

/// `run_with_secret`, calling `after_spawn` with the client pid while
/// SIGTERM is still blocked and no forwarder is installed
#[cfg(unix)]
pub fn run_with_secret_after_spawn<F>(
    mut command: Command,
    secret: &[u8],
    after_spawn: F,
) -> Result<ExitStatus, SupervisorError>
where
    F: FnOnce(u32),
{
    use nix::sys::signal::Signal;
    use std::os::unix::process::CommandExt;

    command.stdin(Stdio::piped());

    let blocked = SignalMask::block(Signal::SIGTERM).map_err(signal_error)?;
    let original = *blocked.previous();
    // SAFETY: pthread_sigmask is async-signal-safe, so fine between fork and exec
    unsafe {
        command.pre_exec(move || original.thread_set_mask().map_err(io::Error::from));
    }

    let mut child = command.spawn().map_err(SupervisorError::Spawn)?;
    info!("Started VPN client (pid {})", child.id());
    after_spawn(child.id());

    let supervised = supervise(&mut child, &original, secret);
    let status = child.wait().map_err(SupervisorError::Wait)?;
    drop(blocked);

    supervised?;
    info!("VPN client exited with {}", status);
    Ok(status)
}

#[cfg(unix)]
fn supervise(
    child: &mut Child,
    original: &nix::sys::signal::SigSet,
    secret: &[u8],
) -> Result<(), SupervisorError> {
    let _forwarder = TerminateForwarder::install(child.id()).map_err(signal_error)?;
    let _unblocked = SignalMask::set(original).map_err(signal_error)?;
    debug!("Forwarding SIGTERM to pid {}", child.id());

    deliver_secret(child, secret)?;
    wait_exited(child).map_err(SupervisorError::Wait)
}

#[cfg(unix)]
fn signal_error(e: nix::Error) -> SupervisorError {
    SupervisorError::Signal(e.into())
}

/// Wait for exit without reaping, so the pid cannot be reused while the
/// forwarder still points at it
#[cfg(target_os = "linux")]
fn wait_exited(child: &mut Child) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::wait::{Id, WaitPidFlag, waitid};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(child.id() as i32);
    loop {
        match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn wait_exited(child: &mut Child) -> io::Result<()> {
    child.wait().map(|_| ())
}

#[cfg(not(unix))]
pub fn run_with_secret(mut command: Command, secret: &[u8]) -> Result<ExitStatus, SupervisorError> {
    command.stdin(Stdio::piped());
    let mut child = command.spawn().map_err(SupervisorError::Spawn)?;
    info!("Started VPN client (pid {})", child.id());

    let delivered = deliver_secret(&mut child, secret);
    let status = child.wait().map_err(SupervisorError::Wait)?;
    delivered?;
    Ok(status)
}

/// Write the secret as raw bytes and close stdin
fn deliver_secret(child: &mut Child, secret: &[u8]) -> Result<(), SupervisorError> {
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(secret).map_err(SupervisorError::Stdin)?;
        stdin.flush().map_err(SupervisorError::Stdin)?;
    }
    Ok(())
}

/// Exit code to propagate; death by signal maps to 128 + signal number
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use nix::sys::signal::{SigSet, Signal};
    use std::fs;

    fn sh(script: &str, arg: &std::path::Path) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script).arg(arg);
        command
    }

    #[test]
    fn test_secret_written_to_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("stdin");

        let status = run_with_secret(sh(r#"cat > "$0""#, &out), b"cookie123").unwrap();

        assert!(status.success());
        assert_eq!(fs::read(&out).unwrap(), b"cookie123");
    }

    #[test]
    fn test_exit_code_propagated() {
        let dir = tempfile::tempdir().unwrap();
        let status = run_with_secret(sh("exit 3", dir.path()), b"").unwrap();
        assert_eq!(exit_code(status), 3);
    }

    #[test]
    fn test_killed_child_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let status = run_with_secret(sh("kill -KILL $$", dir.path()), b"").unwrap();
        assert_eq!(exit_code(status), 128 + 9);
    }

    #[test]
    fn test_spawn_failure() {
        let command = Command::new("/nonexistent/vpn-client");
        let err = run_with_secret(command, b"x").unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn(_)));
    }

    #[test]
    fn test_mask_restored_after_run() {
        let before = SigSet::thread_get_mask().unwrap();
        let dir = tempfile::tempdir().unwrap();
        run_with_secret(sh("exit 0", dir.path()), b"").unwrap();
        let after = SigSet::thread_get_mask().unwrap();
        assert_eq!(
            before.contains(Signal::SIGTERM),
            after.contains(Signal::SIGTERM)
        );
    }

    #[test]
    fn test_signal_mask_guard() {
        assert!(!SigSet::thread_get_mask().unwrap().contains(Signal::SIGUSR2));
        {
            let _blocked = SignalMask::block(Signal::SIGUSR2).unwrap();
            assert!(SigSet::thread_get_mask().unwrap().contains(Signal::SIGUSR2));
        }
        assert!(!SigSet::thread_get_mask().unwrap().contains(Signal::SIGUSR2));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_child_starts_with_sigterm_unblocked() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("status");

        run_with_secret(sh(r#"grep SigBlk /proc/self/status > "$0""#, &out), b"").unwrap();

        let line = fs::read_to_string(&out).unwrap();
        let mask = u64::from_str_radix(line.trim().trim_start_matches("SigBlk:").trim(), 16).unwrap();
        let sigterm_bit = 1u64 << (Signal::SIGTERM as i32 - 1);
        assert_eq!(mask & sigterm_bit, 0);
    }
}
