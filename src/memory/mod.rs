//! 메모리 관리 모듈
//!
//! 커널 힙과 DMA 풀을 제공합니다.

pub mod dma;
pub mod heap;

/// 메모리 서브시스템 초기화
pub fn init() {
    heap::init_once();
    unsafe {
        dma::init();
    }
    let (heap_start, heap_size) = heap::heap_bounds();
    crate::log_info!(
        "Memory subsystem initialized (heap at {:#x}, {} KiB)",
        heap_start,
        heap_size / 1024
    );
}
