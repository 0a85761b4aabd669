//! 8259 PIC 설정
//!
//! 레거시 PIC 두 개를 리매핑하고 IRQ 마스크/EOI를 관리합니다. 이 커널에서
//! PIC를 쓰는 곳은 둘뿐입니다: 타이머(IRQ 0)와 UHCI 컨트롤러의 PCI
//! 인터럽트 라인(런타임에 결정, 보통 IRQ 9-11).

use x86_64::instructions::port::Port;
use x86_64::instructions::interrupts;

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x10;
const ICW1_ICW4: u8 = 0x01;
const ICW4_8086: u8 = 0x01;

/// EOI 명령 (OCW2)
const OCW2_EOI: u8 = 0x20;

/// 리매핑된 벡터 오프셋
///
/// IRQ 0-7 → 벡터 32-39, IRQ 8-15 → 벡터 40-47. CPU 예외 영역(0-31)과
/// 겹치지 않도록 부팅 시 한 번 리매핑합니다.
pub const PIC1_OFFSET: u8 = 32;
pub const PIC2_OFFSET: u8 = 40;

/// 느린 PIC가 직전 명령을 소화할 시간을 줍니다 (포트 0x80 더미 쓰기).
unsafe fn io_wait() {
    Port::new(0x80).write(0u8);
}

/// PIC 초기화 시퀀스 (ICW1-ICW4)
///
/// 두 PIC를 캐스케이드 구성으로 리매핑한 뒤 모든 IRQ를 마스크합니다.
/// 필요한 라인은 이후 `set_mask`로 개별적으로 엽니다.
pub unsafe fn init() {
    let mut pic1_command = Port::new(PIC1_COMMAND);
    let mut pic1_data = Port::new(PIC1_DATA);
    let mut pic2_command = Port::new(PIC2_COMMAND);
    let mut pic2_data = Port::new(PIC2_DATA);

    pic1_command.write(ICW1_INIT | ICW1_ICW4);
    io_wait();
    pic2_command.write(ICW1_INIT | ICW1_ICW4);
    io_wait();

    pic1_data.write(PIC1_OFFSET);
    io_wait();
    pic2_data.write(PIC2_OFFSET);
    io_wait();

    // 캐스케이드: 슬레이브는 마스터의 IRQ 2에 연결
    pic1_data.write(4u8);
    io_wait();
    pic2_data.write(2u8);
    io_wait();

    pic1_data.write(ICW4_8086);
    io_wait();
    pic2_data.write(ICW4_8086);
    io_wait();

    pic1_data.write(0xFFu8);
    pic2_data.write(0xFFu8);
}

/// IRQ 라인 하나를 열거나 닫기
///
/// 마스크 레지스터는 read-modify-write이므로 인터럽트를 막은 채 수행합니다.
/// 슬레이브 쪽 IRQ(8-15)를 열 때 캐스케이드 라인(IRQ 2)은 호출자가 함께
/// 열어야 합니다.
pub unsafe fn set_mask(irq: u8, enabled: bool) {
    interrupts::without_interrupts(|| {
        let mut port = if irq < 8 {
            Port::new(PIC1_DATA)
        } else {
            Port::new(PIC2_DATA)
        };

        let mut mask = port.read() as u8;
        let bit = 1 << (irq % 8);
        if enabled {
            mask &= !bit;
        } else {
            mask |= bit;
        }
        port.write(mask);
    });
}

/// 인터럽트 처리 완료 통지
///
/// 슬레이브 라인이면 슬레이브와 마스터 둘 다에 EOI를 보냅니다.
pub unsafe fn end_of_interrupt(irq: u8) {
    if irq >= 8 {
        Port::new(PIC2_COMMAND).write(OCW2_EOI);
    }
    Port::new(PIC1_COMMAND).write(OCW2_EOI);
}
