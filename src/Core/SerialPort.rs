// Serial device handle. Raw-mode termios on Unix, unsupported elsewhere.

use std::fs::File;
use std::io;
use std::path::Path;

/// Open `port` read-only and non-blocking, configured for raw 8-bit input at `baud_rate`.
///
/// Reads on the returned file yield `WouldBlock` when no data is pending.
#[cfg(unix)]
pub fn open_serial_port(port: &Path, baud_rate: u32) -> io::Result<File> {
    use std::fs::OpenOptions;
    use std::os::fd::AsRawFd;
    use std::os::unix::fs::OpenOptionsExt;

    let file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(port)?;
    let fd = file.as_raw_fd();

    let mut tty: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut tty) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let speed = termios_speed(baud_rate).unwrap_or_else(|| {
        tracing::warn!(
            port = %port.display(),
            baud_rate,
            "unsupported baud rate, falling back to 9600"
        );
        libc::B9600
    });

    unsafe {
        libc::cfmakeraw(&mut tty);
        if libc::cfsetispeed(&mut tty, speed) != 0 || libc::cfsetospeed(&mut tty, speed) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    tty.c_cflag |= libc::CLOCAL | libc::CREAD;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tty) } != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(file)
}

#[cfg(not(unix))]
pub fn open_serial_port(_port: &Path, _baud_rate: u32) -> io::Result<File> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Serial capture only supported on Unix",
    ))
}

/// Map a numeric baud rate to the termios speed constant.
#[cfg(unix)]
pub fn termios_speed(baud_rate: u32) -> Option<libc::speed_t> {
    let speed = match baud_rate {
        0 => libc::B0,
        50 => libc::B50,
        75 => libc::B75,
        110 => libc::B110,
        134 => libc::B134,
        150 => libc::B150,
        200 => libc::B200,
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        1800 => libc::B1800,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460800 => libc::B460800,
        #[cfg(target_os = "linux")]
        500000 => libc::B500000,
        #[cfg(target_os = "linux")]
        576000 => libc::B576000,
        #[cfg(target_os = "linux")]
        921600 => libc::B921600,
        #[cfg(target_os = "linux")]
        1000000 => libc::B1000000,
        #[cfg(target_os = "linux")]
        1152000 => libc::B1152000,
        #[cfg(target_os = "linux")]
        1500000 => libc::B1500000,
        #[cfg(target_os = "linux")]
        2000000 => libc::B2000000,
        #[cfg(target_os = "linux")]
        2500000 => libc::B2500000,
        #[cfg(target_os = "linux")]
        3000000 => libc::B3000000,
        #[cfg(target_os = "linux")]
        3500000 => libc::B3500000,
        #[cfg(target_os = "linux")]
        4000000 => libc::B4000000,
        _ => return None,
    };
    Some(speed)
}
