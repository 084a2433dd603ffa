//! Set the `ASYNC_LOW_LATENCY` flag on a serial port. Without it, many
//! UART drivers buffer several milliseconds of input before waking the
//! reader, which dominates the turnaround time of short query/reply
//! dialogues.

use std::mem;
use std::os::raw::c_schar;
use std::os::unix::prelude::AsRawFd;

use anyhow::anyhow;
use libc::{c_char, c_int, c_short, c_uint, c_ulong};

use crate::Error;

#[repr(C)]
struct SerialStruct {
    typ: c_int,
    line: c_int,
    port: c_uint,
    irq: c_int,
    flags: c_int,
    xmit_fifo_size: c_int,
    custom_divisor: c_int,
    baud_rate: c_int,
    close_delay: c_short,
    io_type: c_schar,
    reserved_char: c_schar,
    hub6: c_int,
    closing_wait: c_short,
    closing_wait2: c_short,
    iomem_base: *mut c_char,
    iomem_reg_shift: c_short,
    port_high: c_int,
    iomap_base: c_ulong,
}

const ASYNC_LOW_LATENCY: c_int = 1 << 13;
const TIOCSSERIAL: c_ulong = 0x541F;

pub(crate) fn apply_low_latency<T: AsRawFd>(port: &T) -> crate::Result<()> {
    let fd = port.as_raw_fd();

    unsafe {
        let mut serial_struct: SerialStruct = mem::zeroed();
        let ss_ref = &mut serial_struct as *mut SerialStruct;
        if libc::ioctl(fd, libc::TIOCGSERIAL, ss_ref) != 0 {
            return Err(Error::other(anyhow!("cannot read serial info struct")));
        }
        serial_struct.flags |= ASYNC_LOW_LATENCY;
        if libc::ioctl(fd, TIOCSSERIAL, ss_ref) != 0 {
            return Err(Error::other(anyhow!("cannot set low latency flag")));
        }
    }

    Ok(())
}
