//! Ferrite OS Kernel Entry Point
//!
//! 부트로더가 커널을 로드한 후 `kernel_main`이 호출됩니다.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use bootloader_api::{entry_point, BootInfo};
use ferrite_os::drivers::usb::core::UsbManager;
use ferrite_os::drivers::usb::uhci;
use ferrite_os::drivers::{keyboard, serial, timer, usb};
use ferrite_os::{interrupts, log_error, log_info, log_warn, memory, serial_print};

entry_point!(kernel_main);

/// 커널 엔트리 포인트
///
/// 초기화 순서:
/// 1. 시리얼 포트 (로깅 출력 경로)
/// 2. IDT / PIC
/// 3. 타이머 (PIT, 1ms 틱)
/// 4. 메모리 (힙, DMA 풀)
/// 5. USB 서브시스템 (UHCI 컨트롤러와 디바이스 열거)
fn kernel_main(_boot_info: &'static mut BootInfo) -> ! {
    serial::init();
    log_info!("Ferrite OS booting...");

    unsafe {
        interrupts::init_idt();
        interrupts::init_pic();
        timer::init();
        // 타이머 IRQ는 sleep_ms가 동작하기 위해 항상 열어둠
        interrupts::set_mask(0, true);
    }
    interrupts::enable_interrupts();

    memory::init();

    match unsafe { usb::init() } {
        Ok(()) => {
            for port in 0..uhci::NUM_ROOT_PORTS {
                if let Some(device) = UsbManager::device_on_port(port) {
                    log_info!(
                        "USB port {}: device {} ({:?})",
                        port,
                        device.address(),
                        device.class_code()
                    );
                }
            }
            log_info!("USB ready, {} device(s)", UsbManager::device_count());
        }
        Err(e) => log_warn!("USB subsystem unavailable: {}", e),
    }

    log_info!("Boot complete");

    // 메인 루프: USB 키보드 입력을 시리얼로 에코
    loop {
        while let Some(event) = keyboard::pop_event() {
            if event.pressed {
                if let Some(ch) = event.ascii {
                    serial_print!("{}", ch);
                }
            }
        }
        x86_64::instructions::hlt();
    }
}

/// 패닉 핸들러
///
/// 패닉 메시지와 최근 로그를 시리얼로 출력한 뒤 정지합니다.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    ferrite_os::interrupts::disable_interrupts();
    log_error!("KERNEL PANIC: {}", info);
    ferrite_os::logging::dump_recent();
    loop {
        x86_64::instructions::hlt();
    }
}
