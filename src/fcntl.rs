//! Open flags passed down from the host.

use bitflags::bitflags;

bitflags! {
    pub struct OpenFlags: i32 {
        const O_RDONLY = libc::O_RDONLY;
        const O_WRONLY = libc::O_WRONLY;
        const O_RDWR = libc::O_RDWR;
        const O_CREATE = libc::O_CREAT;
        const O_TRUNC = libc::O_TRUNC;
        const O_APPEND = libc::O_APPEND;
    }
}

impl OpenFlags {
    /// Decode the raw flag word a host hands over, dropping bits the
    /// filesystem does not interpret.
    pub fn from_raw(flags: i32) -> Self {
        Self::from_bits_truncate(flags)
    }
}
