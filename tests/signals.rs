//! Termination signals against a live session on a pseudo-terminal.

#![cfg(target_os = "linux")]

use std::ffi::CStr;
use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const DEADLINE: Duration = Duration::from_secs(10);

struct Pty {
    slave: File,
}

/// Open a 24x80 pty pair. The master side is drained on a background
/// thread so the session never blocks on output.
fn open_pty() -> Option<Pty> {
    // SAFETY: plain libc calls on a descriptor we own.
    let (master, path) = unsafe {
        let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
        if fd < 0 {
            return None;
        }
        let master = OwnedFd::from_raw_fd(fd);
        if libc::grantpt(fd) != 0 || libc::unlockpt(fd) != 0 {
            return None;
        }
        let ws = libc::winsize {
            ws_row: 24,
            ws_col: 80,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        if libc::ioctl(fd, libc::TIOCSWINSZ, &ws as *const libc::winsize) != 0 {
            return None;
        }
        let mut name = [0 as libc::c_char; 128];
        if libc::ptsname_r(fd, name.as_mut_ptr(), name.len()) != 0 {
            return None;
        }
        let path = CStr::from_ptr(name.as_ptr()).to_str().ok()?.to_owned();
        (master, path)
    };

    let slave = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)
        .ok()?;

    let mut master = File::from(master);
    thread::spawn(move || {
        let mut buf = [0u8; 1024];
        while let Ok(n) = master.read(&mut buf) {
            if n == 0 {
                break;
            }
        }
    });

    Some(Pty { slave })
}

fn attrs(file: &File) -> libc::termios {
    // SAFETY: termios is plain data; tcgetattr fills it in.
    unsafe {
        let mut termios: libc::termios = std::mem::zeroed();
        assert_eq!(libc::tcgetattr(file.as_raw_fd(), &mut termios), 0);
        termios
    }
}

fn same_modes(a: &libc::termios, b: &libc::termios) -> bool {
    a.c_iflag == b.c_iflag
        && a.c_oflag == b.c_oflag
        && a.c_cflag == b.c_cflag
        && a.c_lflag == b.c_lflag
        && a.c_cc[libc::VMIN] == b.c_cc[libc::VMIN]
        && a.c_cc[libc::VTIME] == b.c_cc[libc::VTIME]
}

fn scratch_home(name: &str) -> PathBuf {
    let home = std::env::temp_dir().join(format!("dterm-signals-{}-{}", std::process::id(), name));
    fs::create_dir_all(&home).unwrap();
    home
}

fn spawn_session(pty: &Pty, home: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_dterm"))
        .args(["-g", "direct"])
        .env("HOME", home)
        .env_remove("DTERM_LOG")
        .stdin(Stdio::from(pty.slave.try_clone().unwrap()))
        .stdout(Stdio::from(pty.slave.try_clone().unwrap()))
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

/// Wait until the session has switched the terminal to raw mode.
fn wait_for_raw(pty: &Pty, child: &mut Child) {
    let start = Instant::now();
    while attrs(&pty.slave).c_lflag & libc::ICANON != 0 {
        if let Some(status) = child.try_wait().unwrap() {
            panic!("session exited before entering raw mode: {}", status);
        }
        assert!(start.elapsed() < DEADLINE, "session never entered raw mode");
        thread::sleep(Duration::from_millis(10));
    }
    // Give the session time to finish starting up.
    thread::sleep(Duration::from_millis(200));
}

fn wait(child: &mut Child) -> ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if start.elapsed() > DEADLINE {
            let _ = child.kill();
            panic!("session did not exit");
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn terminate(child: &Child) {
    // SAFETY: plain kill(2) on our own child.
    assert_eq!(unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) }, 0);
}

#[test]
fn test_single_signal_restores_and_fails() {
    let Some(pty) = open_pty() else {
        eprintln!("skipping: no pseudo-terminal available");
        return;
    };
    let home = scratch_home("single");
    let before = attrs(&pty.slave);

    let mut child = spawn_session(&pty, &home);
    wait_for_raw(&pty, &mut child);
    terminate(&child);
    let status = wait(&mut child);
    let _ = fs::remove_dir_all(&home);

    assert_eq!(status.code(), Some(1));
    assert!(same_modes(&attrs(&pty.slave), &before));
}

#[test]
fn test_repeated_signal_restores_before_dying() {
    let Some(pty) = open_pty() else {
        eprintln!("skipping: no pseudo-terminal available");
        return;
    };
    let home = scratch_home("repeated");
    let before = attrs(&pty.slave);

    let mut child = spawn_session(&pty, &home);
    wait_for_raw(&pty, &mut child);
    terminate(&child);
    thread::sleep(Duration::from_millis(10));
    terminate(&child);
    let status = wait(&mut child);
    let _ = fs::remove_dir_all(&home);

    // Either the second signal killed it, or the loop got there first.
    assert!(!status.success(), "unexpected exit: {}", status);
    if let Some(signal) = status.signal() {
        assert_eq!(signal, libc::SIGTERM);
    }
    assert!(same_modes(&attrs(&pty.slave), &before));
}
