//! UHCI 인터럽트 디스패처
//!
//! 컨트롤러의 레거시 인터럽트 라인에 연결되는 top-half입니다. 상태
//! 레지스터를 읽고 같은 비트를 다시 써서 클리어한 뒤, 완료/에러 비트에
//! 대해 파이프 관리자의 `service()`를 호출합니다. 블로킹하지 않고
//! 할당하지 않습니다.

use core::sync::atomic::{AtomicU16, AtomicU8, Ordering};

use super::hw::{PortIo, UhciIo};
use super::{
    pipe, REG_USBSTS, STS_HALTED, STS_HC_PROCESS_ERROR, STS_RESUME_DETECT, STS_USBERRINT,
    STS_USBINT,
};
use crate::interrupts::{idt, pic};

/// 핸들러가 사용하는 컨트롤러 I/O 베이스 (install에서 설정)
static IO_BASE: AtomicU16 = AtomicU16::new(0);
/// 연결된 PIC IRQ 라인
static IRQ_LINE: AtomicU8 = AtomicU8::new(0);

/// 인터럽트 본체 (레지스터 백엔드에 대해 제네릭)
///
/// 상태가 0이면 다른 디바이스와 공유된 라인의 스퓨리어스 인터럽트이므로
/// 아무것도 쓰지 않고 반환합니다.
pub fn dispatch<Io: UhciIo>(io: &mut Io) {
    let status = io.read16(REG_USBSTS);
    if status == 0 {
        return;
    }

    // 읽은 비트를 그대로 다시 써서 클리어 (write-1-to-clear)
    io.write16(REG_USBSTS, status);

    if status & (STS_USBINT | STS_USBERRINT) != 0 {
        pipe::service();
    }
    if status & STS_RESUME_DETECT != 0 {
        crate::log_info!("UHCI: resume detect");
    }
    if status & STS_HC_PROCESS_ERROR != 0 {
        crate::log_error!("UHCI: host controller process error");
    }
    if status & STS_HALTED != 0 {
        // 자동 복구는 지원하지 않음: 컨트롤러 재시작이 필요
        crate::log_error!("UHCI: controller halted");
    }
}

/// 하드웨어 인터럽트 핸들러
extern "x86-interrupt" fn uhci_interrupt_handler(
    _stack_frame: x86_64::structures::idt::InterruptStackFrame,
) {
    let mut io = PortIo::new(IO_BASE.load(Ordering::Relaxed));
    dispatch(&mut io);

    unsafe {
        pic::end_of_interrupt(IRQ_LINE.load(Ordering::Relaxed));
    }
}

/// 인터럽트 핸들러 설치
///
/// PCI 구성 공간의 인터럽트 라인을 PIC 벡터로 매핑하고 마스크를 해제합니다.
///
/// # Safety
/// IDT와 PIC가 초기화된 후, 컨트롤러 bring-up이 끝난 뒤에 호출되어야
/// 합니다.
pub unsafe fn install(io_base: u16, irq: u8) {
    IO_BASE.store(io_base, Ordering::Relaxed);
    IRQ_LINE.store(irq, Ordering::Relaxed);

    let vector = pic::PIC1_OFFSET + irq;
    idt::register_irq_handler(vector, uhci_interrupt_handler);

    if irq >= 8 {
        // 슬레이브 PIC 경유: 캐스케이드 라인도 열어야 함
        pic::set_mask(2, true);
    }
    pic::set_mask(irq, true);
    crate::log_info!("UHCI: interrupt handler installed (IRQ {}, vector {})", irq, vector);
}
