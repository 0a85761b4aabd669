//! 인터럽트 핸들러 모듈
//!
//! 이 모듈은 인터럽트 디스크립터 테이블(IDT) 설정 및 인터럽트 핸들러를 담당합니다.

pub mod idt;
pub mod pic;

pub use idt::{init as init_idt, enable_interrupts, disable_interrupts};
pub use pic::{init as init_pic, PIC1_OFFSET, PIC2_OFFSET, set_mask, end_of_interrupt};
