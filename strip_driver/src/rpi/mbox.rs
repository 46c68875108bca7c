use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;

use anyhow::{bail, Context, Result};
use memmap2::{MmapOptions, MmapRaw};
use nix::sys::stat::{makedev, mknod, Mode, SFlag};

use super::{ioctl, Rpi, PAGE_SIZE, VIDEOCORE_BASE_RPI};

const VIDEOCORE_MAJOR_NUM: u32 = 100;
const MEM_FILE: &str = "/dev/mem";
const VCIO_FILE: &str = "/dev/vcio";

const TAG_ALLOCATE_MEMORY: u32 = 0x3000c;
const TAG_LOCK_MEMORY: u32 = 0x3000d;
const TAG_UNLOCK_MEMORY: u32 = 0x3000e;
const TAG_FREE_MEMORY: u32 = 0x3000f;

const MEM_FLAG_L1_NONALLOCATING: u32 = 0xc;
const MEM_FLAG_DIRECT: u32 = 0x4;

/// A block of VideoCore memory: locked to a bus address and mapped into
/// our address space. Freed in reverse order (unmap, unlock, free).
pub(crate) struct PhysBuf {
    pub(crate) handle: u32,
    pub(crate) bus_addr: u32,
    pub(crate) map: Option<MmapRaw>,
    pub(crate) offs: usize,
    pub(crate) len: usize,
}

/// Convert a BCM2835 bus address to a physical address (datasheet p7).
fn bus_to_phys(bus_addr: u32) -> usize {
    (bus_addr & !0xc000_0000) as usize
}

/// Map a physical address range from `/dev/mem`. The mapping starts at the
/// enclosing page boundary; the returned offset locates the requested
/// address within the mapping.
pub(crate) fn map_mem(phys: usize, bytes: usize) -> Result<(MmapRaw, usize)> {
    let f = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC)
        .open(MEM_FILE)
        .with_context(|| format!("couldn't open {}", MEM_FILE))?;

    let map_addr = phys & !(PAGE_SIZE - 1);
    let len = bytes + (phys - map_addr);
    log::debug!("mapping {} bytes at {:08X} (physAddr {:08X})", len, map_addr, phys);
    let map = MmapOptions::new()
        .offset(map_addr as u64)
        .len(len)
        .map_raw(&f)
        .with_context(|| format!("couldn't map region ({:08X}, {})", phys, len))?;
    Ok((map, phys & (PAGE_SIZE - 1)))
}

/// Create a temporary device node for the mailbox, open it, and remove the
/// node again once it's open.
fn open_temp() -> Result<File> {
    let tf = std::env::temp_dir().join(format!("mailbox-{}", std::process::id()));
    match std::fs::remove_file(&tf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).context("couldn't remove temp mbox"),
    }
    mknod(
        &tf,
        SFlag::S_IFCHR,
        Mode::from_bits_truncate(0o600),
        makedev(VIDEOCORE_MAJOR_NUM as u64, 0),
    )
    .context("couldn't make device node")?;
    let f = File::open(&tf).context("couldn't open temp mbox")?;
    std::fs::remove_file(&tf).context("couldn't remove temp mbox")?;
    Ok(f)
}

/// Open `/dev/vcio` for mailbox ioctls, falling back to a temporary node
/// on systems without it.
pub(crate) fn open() -> Result<File> {
    match File::open(VCIO_FILE) {
        Ok(f) => Ok(f),
        Err(e) if e.kind() == ErrorKind::NotFound => open_temp(),
        Err(e) => Err(e).context("couldn't open mbox"),
    }
}

impl Rpi {
    fn mbox_property(&self, buf: &mut [u32; 32]) -> Result<()> {
        let request = ioctl::iowr(VIDEOCORE_MAJOR_NUM, 0, mem::size_of::<*mut libc::c_void>());
        ioctl::ioctl_arr_u32(self.mbox.as_raw_fd(), request, buf)
            .context("failed ioctl mbox property")
    }

    /// Send one property tag and return the first word of its response
    /// value. The firmware sets bit 31 of the value-size word on success.
    fn property_call(&self, tag: u32, args: &[u32]) -> Result<u32> {
        let mut p = [0u32; 32];
        p[1] = 0; // process request
        p[2] = tag;
        p[3] = (args.len() * 4) as u32;
        p[4] = 0; // request indicator: bit 31 clear, rest reserved
        p[5..5 + args.len()].copy_from_slice(args);
        p[5 + args.len()] = 0; // no more tags
        p[0] = ((6 + args.len()) * 4) as u32;

        self.mbox_property(&mut p)?;
        if p[4] & 0x8000_0000 == 0 {
            bail!("response tag unset: {}", p[4]);
        }
        Ok(p[5])
    }

    fn alloc_vc_mem(&self, size: u32) -> Result<u32> {
        let flags = if self.hw.vc_base == VIDEOCORE_BASE_RPI {
            MEM_FLAG_L1_NONALLOCATING
        } else {
            MEM_FLAG_DIRECT
        };
        let handle = self
            .property_call(TAG_ALLOCATE_MEMORY, &[size, PAGE_SIZE as u32, flags])
            .context("can't allocate videocore memory")?;
        if handle == 0 {
            bail!("out of memory");
        }
        Ok(handle)
    }

    fn lock_vc_mem(&self, handle: u32) -> Result<u32> {
        self.property_call(TAG_LOCK_MEMORY, &[handle])
    }

    fn unlock_vc_mem(&self, handle: u32) -> Result<()> {
        let status = self.property_call(TAG_UNLOCK_MEMORY, &[handle])?;
        if status != 0 {
            bail!("status non-zero: {}", status);
        }
        Ok(())
    }

    fn free_vc_mem(&self, handle: u32) -> Result<()> {
        let status = self.property_call(TAG_FREE_MEMORY, &[handle])?;
        if status != 0 {
            bail!("status non-zero: {}", status);
        }
        Ok(())
    }

    /// Allocate, lock and map one block of VideoCore memory. Any step
    /// failing releases the steps already taken, in reverse order.
    pub(crate) fn get_phys_buf(&self, size: u32) -> Result<PhysBuf> {
        let handle = self
            .alloc_vc_mem(size)
            .with_context(|| format!("couldn't alloc {} bytes", size))?;
        let bus_addr = match self.lock_vc_mem(handle) {
            Ok(a) => a,
            Err(e) => {
                let _ = self.free_vc_mem(handle);
                return Err(e.context(format!("couldn't lock handle {:X}", handle)));
            }
        };
        let (map, offs) = match map_mem(bus_to_phys(bus_addr), size as usize) {
            Ok(m) => m,
            Err(e) => {
                let _ = self.unlock_vc_mem(handle);
                let _ = self.free_vc_mem(handle);
                return Err(e.context(format!("couldn't map busAddr {:08X}", bus_addr)));
            }
        };
        log::debug!("mapped {} bytes, busaddr {:08X}, offset {}", size, bus_addr, offs);
        Ok(PhysBuf { handle, bus_addr, map: Some(map), offs, len: size as usize })
    }

    pub(crate) fn free_phys_buf(&self, pb: &mut PhysBuf) -> Result<()> {
        let mut first_err = Ok(());
        pb.map = None; // unmap
        if pb.bus_addr != 0 {
            pb.bus_addr = 0;
            first_err = self.unlock_vc_mem(pb.handle);
        }
        if pb.handle != 0 {
            let e = self.free_vc_mem(pb.handle);
            pb.handle = 0;
            if first_err.is_ok() {
                first_err = e;
            }
        }
        first_err
    }
}
