//! UHCI (Universal Host Controller Interface) 드라이버
//!
//! USB 1.1 호스트 컨트롤러 드라이버입니다. 레지스터는 I/O 포트 공간에
//! 있으며, 스케줄(Frame List)과 전송 구조체(TD/QH)는 컨트롤러가 DMA로
//! 직접 소비합니다.
//!
//! 모듈 구성:
//! - `hw`: 레지스터 접근 추상화
//! - `schedule`: 1024 엔트리 Frame List
//! - `td`: Transfer Descriptor / Queue Head
//! - `transfer`: 동기 제어 전송 엔진
//! - `enumerate`: 포트 리셋과 디바이스 열거
//! - `pipe`: 주기적 인터럽트 IN 파이프
//! - `isr`: 인터럽트 디스패처

pub mod hw;
pub mod schedule;
pub mod td;
pub mod transfer;
pub mod enumerate;
pub mod pipe;
pub mod isr;

#[cfg(test)]
pub mod sim;

use crate::drivers::pci::PciDevice;
use crate::drivers::usb::error::UsbError;
use crate::drivers::usb::host_controller::{UsbHostController, UsbHostControllerType};
use hw::{PortIo, UhciIo};
use schedule::FRAME_LIST;

/// 레지스터 오프셋 (I/O 베이스 기준)
pub const REG_USBCMD: u16 = 0x00;
pub const REG_USBSTS: u16 = 0x02;
pub const REG_USBINTR: u16 = 0x04;
pub const REG_FRNUM: u16 = 0x06;
pub const REG_FLBASEADD: u16 = 0x08;
pub const REG_PORTSC_BASE: u16 = 0x10;

/// USBCMD 비트
pub const CMD_RUN_STOP: u16 = 1 << 0;
pub const CMD_GLOBAL_RESET: u16 = 1 << 1;

/// USBSTS 비트
pub const STS_USBINT: u16 = 1 << 0;
pub const STS_USBERRINT: u16 = 1 << 1;
pub const STS_RESUME_DETECT: u16 = 1 << 2;
pub const STS_HC_PROCESS_ERROR: u16 = 1 << 3;
pub const STS_HALTED: u16 = 1 << 5;

/// USBINTR 비트
pub const INTR_TIMEOUT_CRC: u16 = 1 << 0;
pub const INTR_IOC: u16 = 1 << 2;

/// PORTSC 비트
pub const PORTSC_CONNECT: u16 = 1 << 0;
pub const PORTSC_ENABLE: u16 = 1 << 2;
pub const PORTSC_RESET: u16 = 1 << 9;

/// 링크 포인터 비트 (Frame List 엔트리, TD/QH 링크 공통)
pub const LINK_TERMINATE: u32 = 0x1;
pub const LINK_QH_SELECT: u32 = 0x2;
pub const LINK_VF_DEPTH_FIRST: u32 = 0x4;

/// FRNUM 유효 비트 (11비트)
pub const FRNUM_MASK: u16 = 0x7FF;

/// 루트 포트 수 (UHCI 고정)
pub const NUM_ROOT_PORTS: u8 = 2;

/// UHCI 호스트 컨트롤러
///
/// `Io` 파라미터로 레지스터 접근을 추상화합니다. 커널에서는 `PortIo`,
/// 테스트에서는 시뮬레이터를 사용합니다.
pub struct UhciController<Io: UhciIo = PortIo> {
    io: Io,
    pci: Option<PciDevice>,
    running: bool,
}

impl UhciController<PortIo> {
    /// PCI 디바이스에서 컨트롤러 생성
    ///
    /// UHCI는 I/O BAR(BAR4)를 사용합니다.
    pub fn new(pci: PciDevice) -> Result<Self, UsbError> {
        let io_base = pci.io_base().ok_or(UsbError::ControllerInitFailed)?;
        crate::log_debug!("UHCI controller at I/O base 0x{:04X}", io_base);
        Ok(Self {
            io: PortIo::new(io_base),
            pci: Some(pci),
            running: false,
        })
    }

    /// 컨트롤러의 I/O 베이스 주소
    pub fn io_base(&self) -> u16 {
        self.io.io_base()
    }
}

impl<Io: UhciIo> UhciController<Io> {
    /// 임의의 레지스터 백엔드로 컨트롤러 생성 (테스트용)
    pub fn with_io(io: Io) -> Self {
        Self {
            io,
            pci: None,
            running: false,
        }
    }

    /// 레지스터 백엔드 접근
    pub fn io_mut(&mut self) -> &mut Io {
        &mut self.io
    }

    /// 현재 프레임 번호 (0-1023)
    pub fn current_frame(&mut self) -> u16 {
        self.io.read16(REG_FRNUM) & FRNUM_MASK
    }

    /// 컨트롤러 시작 시퀀스
    ///
    /// 글로벌 리셋 → halted 확인 → Frame List 초기화 및 베이스 주소 기록
    /// (readback 확인) → 인터럽트 마스크 → Run. 확인 단계가 실패하면
    /// 컨트롤러는 사용 불가로 간주합니다.
    fn bring_up(&mut self) -> Result<(), UsbError> {
        // 버스 마스터링 없이는 컨트롤러가 Frame List를 읽지 못합니다.
        if let Some(pci) = &self.pci {
            unsafe { pci.enable_bus_mastering() };
        }

        // 글로벌 리셋 (최소 10ms 유지)
        self.io.write16(REG_USBCMD, CMD_GLOBAL_RESET);
        self.io.delay_ms(10);
        self.io.write16(REG_USBCMD, 0);
        self.io.delay_ms(10);

        let status = self.io.read16(REG_USBSTS);
        if status & STS_HALTED == 0 {
            crate::log_error!("UHCI: controller not halted after reset (status=0x{:04X})", status);
            return Err(UsbError::ControllerInitFailed);
        }

        // Frame List 초기화: 모든 엔트리 terminate
        FRAME_LIST.reset_all();
        let frame_list_phys = FRAME_LIST.phys_base();
        self.io.write32(REG_FLBASEADD, frame_list_phys);
        let readback = self.io.read32(REG_FLBASEADD);
        if readback & !0xFFF != frame_list_phys & !0xFFF {
            crate::log_error!(
                "UHCI: frame list base readback mismatch (wrote 0x{:08X}, read 0x{:08X})",
                frame_list_phys,
                readback
            );
            return Err(UsbError::ControllerInitFailed);
        }

        // 프레임 번호를 0에서 시작
        self.io.write16(REG_FRNUM, 0);

        // 완료/에러 인터럽트 활성화 (실패 시 폴링으로 동작 가능하므로 경고만)
        let intr_mask = INTR_IOC | INTR_TIMEOUT_CRC;
        self.io.write16(REG_USBINTR, intr_mask);
        let intr_readback = self.io.read16(REG_USBINTR);
        if intr_readback != intr_mask {
            crate::log_warn!(
                "UHCI: interrupt mask readback mismatch (wrote 0x{:04X}, read 0x{:04X}), falling back to polling",
                intr_mask,
                intr_readback
            );
        }

        // Run
        self.io.write16(REG_USBCMD, CMD_RUN_STOP);
        self.io.delay_ms(1);
        let status = self.io.read16(REG_USBSTS);
        if status & (STS_HALTED | STS_HC_PROCESS_ERROR) != 0 {
            crate::log_error!("UHCI: controller failed to start (status=0x{:04X})", status);
            return Err(UsbError::ControllerInitFailed);
        }

        self.running = true;
        crate::log_info!(
            "UHCI controller running (frame list at 0x{:08X}, {} root ports)",
            frame_list_phys,
            NUM_ROOT_PORTS
        );
        Ok(())
    }

    /// 모든 루트 포트를 열거
    ///
    /// 각 포트는 독립적으로 처리되며, 한 포트의 실패가 다른 포트에
    /// 영향을 주지 않습니다.
    pub fn enumerate_ports(&mut self) -> [Option<crate::drivers::usb::device::UsbDevice>; NUM_ROOT_PORTS as usize] {
        let mut devices = [None, None];
        for port in 0..NUM_ROOT_PORTS {
            match enumerate::enumerate_port(self, port) {
                Ok(device) => {
                    devices[port as usize] = Some(device);
                }
                Err(UsbError::DeviceNotFound) => {
                    crate::log_debug!("UHCI: no device on port {}", port);
                }
                Err(e) => {
                    crate::log_warn!("UHCI: enumeration failed on port {}: {}", port, e);
                }
            }
        }
        devices
    }
}

impl<Io: UhciIo> UsbHostController for UhciController<Io> {
    fn init(&mut self) -> Result<(), UsbError> {
        self.bring_up()
    }

    fn controller_type(&self) -> UsbHostControllerType {
        UsbHostControllerType::Uhci
    }

    fn port_count(&self) -> u8 {
        NUM_ROOT_PORTS
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
