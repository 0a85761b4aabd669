//! USB (Universal Serial Bus) 드라이버 모듈
//!
//! USB 1.1 호스트 컨트롤러(UHCI)와 디바이스 관리를 담당합니다.
//!
//! 구성:
//! - `uhci`: UHCI 호스트 컨트롤러 드라이버 (스케줄, 전송, 열거, 파이프)
//! - `core`: USB 매니저 (컨트롤러 탐색과 초기화의 진입점)
//! - `descriptor` / `request` / `device`: USB 프로토콜 자료구조
//!
//! xHCI/EHCI/OHCI 컨트롤러는 감지만 하고 초기화하지 않습니다.

pub mod core;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod host_controller;
pub mod request;
pub mod uhci;

pub use device::UsbDevice;
pub use error::UsbError;
pub use host_controller::{UsbHostController, UsbHostControllerType};

/// USB 클래스 코드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbClassCode {
    /// Human Interface Device (키보드, 마우스 등)
    Hid = 0x03,
    /// Mass Storage (USB 저장장치)
    MassStorage = 0x08,
    /// Hub (USB 허브)
    Hub = 0x09,
    /// Audio (오디오 장치)
    Audio = 0x01,
    /// Unknown/Other
    Unknown = 0xFF,
}

impl From<u8> for UsbClassCode {
    fn from(code: u8) -> Self {
        match code {
            0x03 => UsbClassCode::Hid,
            0x08 => UsbClassCode::MassStorage,
            0x09 => UsbClassCode::Hub,
            0x01 => UsbClassCode::Audio,
            _ => UsbClassCode::Unknown,
        }
    }
}

/// USB 서브시스템 초기화
///
/// UHCI 컨트롤러를 찾아 시작하고 루트 포트의 디바이스를 열거합니다.
///
/// # Safety
/// PCI 버스, 메모리 관리, IDT/PIC가 초기화된 후에 호출되어야 합니다.
pub unsafe fn init() -> Result<(), UsbError> {
    core::UsbManager::init()
}
