//! IDT (Interrupt Descriptor Table) 구현
//!
//! 이 모듈은 인터럽트 디스크립터 테이블을 설정하고 관리합니다.

use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use x86_64::instructions::interrupts;

use crate::{log_error, log_warn, log_debug, log_info};

/// 전역 IDT
pub static mut IDT: InterruptDescriptorTable = InterruptDescriptorTable::new();

/// IDT 초기화
///
/// 모든 예외 및 인터럽트 핸들러를 등록합니다.
pub unsafe fn init() {
    IDT.divide_error.set_handler_fn(divide_error_handler);
    IDT.breakpoint.set_handler_fn(breakpoint_handler);
    IDT.invalid_opcode.set_handler_fn(invalid_opcode_handler);
    IDT.double_fault.set_handler_fn(double_fault_handler);
    IDT.general_protection_fault.set_handler_fn(general_protection_fault_handler);
    IDT.page_fault.set_handler_fn(page_fault_handler);

    // 하드웨어 인터럽트 (PIC 인터럽트)
    // IRQ 0: 타이머 (인터럽트 32)
    IDT[32].set_handler_fn(crate::drivers::timer::timer_interrupt_handler);

    // IDT 로드
    IDT.load();
}

/// 하드웨어 인터럽트 핸들러 등록
///
/// PCI 디바이스처럼 IRQ 라인이 런타임에 결정되는 드라이버가 사용합니다.
///
/// # Arguments
/// * `vector` - 인터럽트 벡터 번호 (PIC 오프셋이 적용된 값)
/// * `handler` - 핸들러 함수
pub unsafe fn register_irq_handler(vector: u8, handler: extern "x86-interrupt" fn(InterruptStackFrame)) {
    IDT[vector as usize].set_handler_fn(handler);
    IDT.load();
    log_info!("Registered interrupt handler for vector 0x{:02x}", vector);
}

/// 예외 핸들러: Divide Error (0x00)
extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    log_error!("Divide Error Exception");
    log_error!("Stack Frame: {:#?}", stack_frame);
    loop {
        x86_64::instructions::hlt();
    }
}

/// 예외 핸들러: Breakpoint (0x03)
extern "x86-interrupt" fn breakpoint_handler(_stack_frame: InterruptStackFrame) {
    log_debug!("Breakpoint Exception");
    // 디버깅을 위해 무한 루프하지 않음
}

/// 예외 핸들러: Invalid Opcode (0x06)
extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    log_error!("Invalid Opcode Exception");
    log_error!("Instruction Pointer: {:#016x}", stack_frame.instruction_pointer.as_u64());
    loop {
        x86_64::instructions::hlt();
    }
}

/// 예외 핸들러: Double Fault (0x08)
extern "x86-interrupt" fn double_fault_handler(stack_frame: InterruptStackFrame, error_code: u64) -> ! {
    log_error!("=== Double Fault Exception ===");
    log_error!("Error Code: {:#016x}", error_code);
    log_error!("RIP: {:#016x}", stack_frame.instruction_pointer.as_u64());
    crate::logging::dump_recent();
    loop {
        x86_64::instructions::hlt();
    }
}

/// 예외 핸들러: General Protection Fault (0x0D)
extern "x86-interrupt" fn general_protection_fault_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    log_error!("=== General Protection Fault ===");
    log_error!("Error Code: {:#016x}", error_code);
    log_error!("RIP: {:#016x}", stack_frame.instruction_pointer.as_u64());
    loop {
        x86_64::instructions::hlt();
    }
}

/// 예외 핸들러: Page Fault (0x0E)
extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    log_error!("Page Fault Exception");
    log_error!("Accessed Address: {:#016x}", Cr2::read().as_u64());
    log_error!("Error Code: {:?}", error_code);
    log_error!("RIP: {:#016x}", stack_frame.instruction_pointer.as_u64());
    if error_code.contains(PageFaultErrorCode::USER_MODE) {
        log_warn!("Fault occurred in user mode");
    }
    loop {
        x86_64::instructions::hlt();
    }
}

/// 인터럽트 활성화
pub fn enable_interrupts() {
    interrupts::enable();
}

/// 인터럽트 비활성화
pub fn disable_interrupts() {
    interrupts::disable();
}
