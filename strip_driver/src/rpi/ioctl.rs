use std::os::unix::io::RawFd;

use anyhow::{Context, Result};

// _IOC request encoding, per include/uapi/asm-generic/ioctl.h.

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

fn ioc(dir: u32, typ: u32, nr: u32, size: u32) -> libc::c_ulong {
    ((dir << IOC_DIRSHIFT) | (typ << IOC_TYPESHIFT) | (nr << IOC_NRSHIFT) | (size << IOC_SIZESHIFT))
        as libc::c_ulong
}

pub(crate) fn iowr(typ: u32, nr: u32, size: usize) -> libc::c_ulong {
    ioc(IOC_READ | IOC_WRITE, typ, nr, size as u32)
}

/// ioctl taking a uint32 buffer, read and written in place.
pub(crate) fn ioctl_arr_u32(fd: RawFd, request: libc::c_ulong, buf: &mut [u32]) -> Result<()> {
    let rc = unsafe { libc::ioctl(fd, request, buf.as_mut_ptr()) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error()).context("ioctl failed");
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encodes_spi_wr_max_speed() {
        // _IOW('k', 4, __u32) as used by spidev
        let req = ioc(IOC_WRITE, b'k' as u32, 4, 4);
        assert_eq!(req, 0x40046b04);
    }
}
