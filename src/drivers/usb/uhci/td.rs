//! UHCI Transfer Descriptor / Queue Head
//!
//! TD와 QH는 하드웨어가 DMA로 직접 읽고 쓰는 16바이트 정렬 구조체입니다.
//! Active 비트는 소프트웨어만 설정하고 하드웨어만 클리어합니다. 필드 접근은
//! 전부 volatile입니다.

use core::cell::UnsafeCell;
use core::ptr::NonNull;

use super::{LINK_TERMINATE, LINK_VF_DEPTH_FIRST};
use crate::drivers::usb::error::UsbError;
use crate::memory::dma;

/// control_status 비트
pub const TD_STATUS_ACTIVE: u32 = 1 << 23;
pub const TD_STATUS_IOC: u32 = 1 << 24;
pub const TD_STATUS_SPD: u32 = 1 << 29;
pub const TD_STATUS_STALLED: u32 = 1 << 22;
pub const TD_STATUS_DATA_BUFFER_ERROR: u32 = 1 << 21;
pub const TD_STATUS_BABBLE: u32 = 1 << 20;
pub const TD_STATUS_NAK: u32 = 1 << 19;
pub const TD_STATUS_CRC_TIMEOUT: u32 = 1 << 18;
pub const TD_STATUS_BITSTUFF: u32 = 1 << 17;

/// 실제 전송된 길이 필드 마스크 (하위 11비트)
pub const TD_ACTLEN_MASK: u32 = 0x7FF;

/// USB 패킷 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pid {
    Setup = 0x2D,
    In = 0x69,
    Out = 0xE1,
}

/// TD token 필드 구성
///
/// `max_len`은 실제 바이트 수이며 하드웨어 인코딩(길이 - 1, 11비트)으로
/// 변환됩니다. 길이 0은 0x7FF로 인코딩됩니다.
pub fn build_token(pid: Pid, device_address: u8, endpoint: u8, toggle: bool, max_len: u16) -> u32 {
    let encoded_len: u32 = if max_len == 0 {
        0x7FF
    } else {
        u32::from(max_len) - 1
    };
    (pid as u32)
        | (u32::from(device_address & 0x7F) << 8)
        | (u32::from(endpoint & 0x0F) << 15)
        | (u32::from(toggle) << 19)
        | (encoded_len << 21)
}

/// control_status 값에서 에러 플래그 해석
///
/// Active가 클리어된 TD에 대해서만 의미가 있습니다. 에러가 없으면 Ok.
pub fn classify_status(control_status: u32) -> Result<(), UsbError> {
    if control_status & TD_STATUS_STALLED != 0 {
        Err(UsbError::TransferStalled)
    } else if control_status & TD_STATUS_DATA_BUFFER_ERROR != 0 {
        Err(UsbError::DataBufferError)
    } else if control_status & TD_STATUS_BABBLE != 0 {
        Err(UsbError::Babble)
    } else if control_status & TD_STATUS_NAK != 0 {
        Err(UsbError::Nak)
    } else if control_status & TD_STATUS_CRC_TIMEOUT != 0 {
        Err(UsbError::CrcTimeout)
    } else if control_status & TD_STATUS_BITSTUFF != 0 {
        Err(UsbError::BitStuffError)
    } else {
        Ok(())
    }
}

/// Transfer Descriptor (하드웨어 레이아웃, 16바이트 정렬)
#[repr(C, align(16))]
pub struct TransferDescriptor {
    link: UnsafeCell<u32>,
    control_status: UnsafeCell<u32>,
    token: UnsafeCell<u32>,
    buffer: UnsafeCell<u32>,
}

unsafe impl Sync for TransferDescriptor {}

impl TransferDescriptor {
    /// 다음 TD로의 depth-first 링크 설정
    pub fn set_link_td(&self, next_td_phys: u32) {
        unsafe { core::ptr::write_volatile(self.link.get(), next_td_phys | LINK_VF_DEPTH_FIRST) }
    }

    /// 체인 종료 표시
    pub fn set_link_terminate(&self) {
        unsafe { core::ptr::write_volatile(self.link.get(), LINK_TERMINATE) }
    }

    pub fn link(&self) -> u32 {
        unsafe { core::ptr::read_volatile(self.link.get()) }
    }

    pub fn set_control_status(&self, value: u32) {
        unsafe { core::ptr::write_volatile(self.control_status.get(), value) }
    }

    pub fn control_status(&self) -> u32 {
        unsafe { core::ptr::read_volatile(self.control_status.get()) }
    }

    pub fn set_token(&self, value: u32) {
        unsafe { core::ptr::write_volatile(self.token.get(), value) }
    }

    pub fn token(&self) -> u32 {
        unsafe { core::ptr::read_volatile(self.token.get()) }
    }

    pub fn set_buffer(&self, buffer_phys: u32) {
        unsafe { core::ptr::write_volatile(self.buffer.get(), buffer_phys) }
    }

    pub fn buffer(&self) -> u32 {
        unsafe { core::ptr::read_volatile(self.buffer.get()) }
    }

    /// Active 비트가 설정되어 있는지 확인
    pub fn is_active(&self) -> bool {
        self.control_status() & TD_STATUS_ACTIVE != 0
    }

    /// 실제 전송된 바이트 수 (하드웨어 인코딩 +1, 0x7FF = 0바이트)
    pub fn actual_length(&self) -> u16 {
        let raw = self.control_status() & TD_ACTLEN_MASK;
        if raw == 0x7FF {
            0
        } else {
            (raw + 1) as u16
        }
    }
}

/// Queue Head (하드웨어 레이아웃, 16바이트 정렬)
#[repr(C, align(16))]
pub struct QueueHead {
    horizontal_link: UnsafeCell<u32>,
    vertical_link: UnsafeCell<u32>,
}

unsafe impl Sync for QueueHead {}

impl QueueHead {
    pub fn set_horizontal_terminate(&self) {
        unsafe { core::ptr::write_volatile(self.horizontal_link.get(), LINK_TERMINATE) }
    }

    /// 첫 TD로의 수직 링크 설정
    pub fn set_vertical_td(&self, td_phys: u32) {
        unsafe { core::ptr::write_volatile(self.vertical_link.get(), td_phys) }
    }

    pub fn vertical_link(&self) -> u32 {
        unsafe { core::ptr::read_volatile(self.vertical_link.get()) }
    }

    pub fn horizontal_link(&self) -> u32 {
        unsafe { core::ptr::read_volatile(self.horizontal_link.get()) }
    }
}

/// DMA 풀에서 TD 할당 (0으로 초기화됨)
pub fn alloc_td() -> Result<NonNull<TransferDescriptor>, UsbError> {
    dma::alloc(core::mem::size_of::<TransferDescriptor>(), 16)
        .map(NonNull::cast)
        .ok_or(UsbError::AllocationFailed)
}

/// DMA 풀에서 QH 할당 (0으로 초기화됨)
pub fn alloc_qh() -> Result<NonNull<QueueHead>, UsbError> {
    dma::alloc(core::mem::size_of::<QueueHead>(), 16)
        .map(NonNull::cast)
        .ok_or(UsbError::AllocationFailed)
}

pub fn free_td(td: NonNull<TransferDescriptor>) {
    dma::free(td.cast());
}

pub fn free_qh(qh: NonNull<QueueHead>) {
    dma::free(qh.cast());
}

/// TD의 물리 주소
pub fn td_phys(td: NonNull<TransferDescriptor>) -> u32 {
    dma::virt_to_phys(td.as_ptr() as *const u8)
}

/// QH의 물리 주소
pub fn qh_phys(qh: NonNull<QueueHead>) -> u32 {
    dma::virt_to_phys(qh.as_ptr() as *const u8)
}
