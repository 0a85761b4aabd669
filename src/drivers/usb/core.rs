//! USB 코어 시스템
//!
//! USB 서브시스템의 중앙 관리자입니다. 컨트롤러 탐색, bring-up, 인터럽트
//! 핸들러 설치, 루트 포트 열거를 순서대로 수행하고 발견된 디바이스를
//! 보관합니다.

use spin::Mutex;

use crate::drivers::usb::device::UsbDevice;
use crate::drivers::usb::error::UsbError;
use crate::drivers::usb::host_controller::{find_uhci_controller, UsbHostController};
use crate::drivers::usb::uhci::{isr, UhciController, NUM_ROOT_PORTS};

/// USB 매니저
pub struct UsbManager {
    /// 루트 포트별 열거된 디바이스
    devices: [Option<UsbDevice>; NUM_ROOT_PORTS as usize],
    /// 초기화 여부
    initialized: bool,
}

static MANAGER: Mutex<UsbManager> = Mutex::new(UsbManager {
    devices: [None, None],
    initialized: false,
});

impl UsbManager {
    /// USB 매니저 초기화
    ///
    /// # Safety
    /// PCI 버스, 메모리 관리, IDT/PIC가 초기화된 후에 호출되어야 합니다.
    pub unsafe fn init() -> Result<(), UsbError> {
        let mut manager = MANAGER.lock();
        if manager.initialized {
            return Ok(());
        }

        crate::log_info!("Scanning for USB host controllers...");
        let pci = find_uhci_controller().ok_or_else(|| {
            crate::log_warn!("No UHCI host controller found");
            UsbError::DeviceNotFound
        })?;

        let mut controller = UhciController::new(pci)?;
        controller.init()?;

        // 인터럽트 핸들러는 컨트롤러가 동작한 뒤에 설치
        let irq = pci.interrupt_line;
        if irq < 16 {
            isr::install(controller.io_base(), irq);
        } else {
            crate::log_warn!(
                "UHCI: invalid interrupt line {}, input will rely on polling",
                irq
            );
        }

        let devices = controller.enumerate_ports();
        let count = devices.iter().filter(|d| d.is_some()).count();
        manager.devices = devices;
        manager.initialized = true;

        crate::log_info!("USB manager initialized ({} device(s) enumerated)", count);
        Ok(())
    }

    /// 열거된 디바이스 수
    pub fn device_count() -> usize {
        MANAGER.lock().devices.iter().filter(|d| d.is_some()).count()
    }

    /// 포트별 디바이스 정보 조회
    pub fn device_on_port(port: u8) -> Option<UsbDevice> {
        let manager = MANAGER.lock();
        manager
            .devices
            .get(port as usize)
            .and_then(|d| d.as_ref().copied())
    }
}
