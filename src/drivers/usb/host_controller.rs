//! USB 호스트 컨트롤러 감지
//!
//! 이 모듈은 PCI 버스에서 USB 호스트 컨트롤러를 감지하고 공통 인터페이스를
//! 정의합니다. 현재 구현된 컨트롤러는 UHCI(USB 1.1)뿐이며, 다른 타입은
//! 감지만 하고 건너뜁니다.

use crate::drivers::pci::{self, PciDevice};
use crate::drivers::usb::error::UsbError;

/// USB 호스트 컨트롤러 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbHostControllerType {
    /// xHCI (eXtensible Host Controller Interface) - USB 3.0
    Xhci,
    /// EHCI (Enhanced Host Controller Interface) - USB 2.0
    Ehci,
    /// OHCI (Open Host Controller Interface) - USB 1.1
    Ohci,
    /// UHCI (Universal Host Controller Interface) - USB 1.1
    Uhci,
}

/// USB 호스트 컨트롤러 인터페이스
pub trait UsbHostController {
    /// 호스트 컨트롤러 초기화
    fn init(&mut self) -> Result<(), UsbError>;

    /// 호스트 컨트롤러 타입
    fn controller_type(&self) -> UsbHostControllerType;

    /// 루트 포트 수
    fn port_count(&self) -> u8;

    /// 컨트롤러가 동작 중인지 확인
    fn is_running(&self) -> bool;
}

/// PCI 디바이스에서 USB 호스트 컨트롤러 타입 확인
pub fn get_usb_controller_type(pci_device: &PciDevice) -> Option<UsbHostControllerType> {
    if pci_device.class_code == pci::PCI_CLASS_SERIAL_BUS
        && pci_device.subclass == pci::PCI_SUBCLASS_USB
    {
        match pci_device.prog_if {
            0x30 => Some(UsbHostControllerType::Xhci),
            0x20 => Some(UsbHostControllerType::Ehci),
            0x10 => Some(UsbHostControllerType::Ohci),
            0x00 => Some(UsbHostControllerType::Uhci),
            _ => None,
        }
    } else {
        None
    }
}

/// PCI를 통한 UHCI 호스트 컨트롤러 감지
///
/// 첫 번째 UHCI 컨트롤러를 반환합니다. 다른 타입의 컨트롤러는 로그만 남깁니다.
///
/// # Safety
/// PCI 버스가 초기화된 후에 호출되어야 합니다.
pub unsafe fn find_uhci_controller() -> Option<PciDevice> {
    let mut found: Option<PciDevice> = None;

    pci::scan_pci_bus(|device| {
        match get_usb_controller_type(device) {
            Some(UsbHostControllerType::Uhci) => {
                crate::log_info!(
                    "Found UHCI host controller (Vendor=0x{:04X}, Device=0x{:04X}, IRQ={})",
                    device.vendor_id,
                    device.device_id,
                    device.interrupt_line
                );
                found = Some(*device);
                true // 스캔 중단
            }
            Some(other) => {
                crate::log_debug!("Skipping unsupported USB host controller: {:?}", other);
                false
            }
            None => false,
        }
    });

    found
}
