//! UHCI 레지스터 접근 추상화
//!
//! UHCI는 레지스터를 I/O 포트 공간에 노출합니다. 실제 하드웨어 접근은
//! `PortIo`가 수행하고, 테스트는 시뮬레이터 구현으로 대체합니다.

use x86_64::instructions::port::Port;

/// UHCI 레지스터 접근 인터페이스
///
/// 오프셋은 컨트롤러의 I/O 베이스 주소에 대한 상대값입니다.
pub trait UhciIo {
    fn read16(&mut self, offset: u16) -> u16;
    fn write16(&mut self, offset: u16, value: u16);
    fn read32(&mut self, offset: u16) -> u32;
    fn write32(&mut self, offset: u16, value: u32);

    /// 지정한 밀리초 동안 대기
    ///
    /// 하드웨어는 이 시간 동안 스케줄을 계속 소비합니다.
    fn delay_ms(&mut self, ms: u64);
}

/// 실제 I/O 포트를 통한 레지스터 접근
pub struct PortIo {
    io_base: u16,
}

impl PortIo {
    pub fn new(io_base: u16) -> Self {
        Self { io_base }
    }

    pub fn io_base(&self) -> u16 {
        self.io_base
    }
}

impl UhciIo for PortIo {
    fn read16(&mut self, offset: u16) -> u16 {
        let mut port: Port<u16> = Port::new(self.io_base + offset);
        unsafe { port.read() }
    }

    fn write16(&mut self, offset: u16, value: u16) {
        let mut port: Port<u16> = Port::new(self.io_base + offset);
        unsafe { port.write(value) }
    }

    fn read32(&mut self, offset: u16) -> u32 {
        let mut port: Port<u32> = Port::new(self.io_base + offset);
        unsafe { port.read() }
    }

    fn write32(&mut self, offset: u16, value: u32) {
        let mut port: Port<u32> = Port::new(self.io_base + offset);
        unsafe { port.write(value) }
    }

    fn delay_ms(&mut self, ms: u64) {
        crate::drivers::timer::sleep_ms(ms);
    }
}
