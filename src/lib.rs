//! Ferrite OS Kernel Library
//!
//! 커널의 라이브러리 루트입니다. 각 커널 모듈은 여기서 export됩니다.
//!
//! 테스트 바이너리는 호스트에서 실행되므로 하드웨어를 만지는 경로(시리얼
//! 포트, PIC, 실제 UHCI 레지스터)는 테스트에서 시뮬레이터나 no-op으로
//! 대체됩니다.

#![cfg_attr(not(test), no_std)]
#![feature(custom_test_frameworks)]
#![feature(abi_x86_interrupt)]
#![test_runner(crate::test_runner)]

extern crate alloc;

pub mod drivers;
pub mod interrupts;
pub mod logging;
pub mod memory;

// 매크로는 자동으로 crate 루트에 사용 가능하므로 재export 불필요
// 사용: ferrite_os::serial_println!() 또는 ferrite_os::log_info!()

/// 테스트 러너
#[cfg(test)]
pub fn test_runner(tests: &[&dyn Fn()]) {
    memory::heap::init_once();
    serial_println!("running {} tests", tests.len());
    for test in tests {
        test();
    }
    serial_println!("all tests passed");
}
