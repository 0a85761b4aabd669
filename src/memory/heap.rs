//! 힙 할당자 설정
//!
//! 이 모듈은 커널 힙 할당자를 초기화하고 전역 할당자로 설정합니다.
//! 힙 저장소는 커널 이미지 안의 정적 배열이므로 페이지 테이블 조작 없이
//! 부팅 직후부터 사용할 수 있습니다.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};
use linked_list_allocator::LockedHeap;

/// 힙 크기 (256 KB - 디바이스 테이블과 로그 링에 충분)
const HEAP_SIZE: usize = 256 * 1024;

#[repr(C, align(4096))]
struct HeapStorage {
    bytes: UnsafeCell<[u8; HEAP_SIZE]>,
}

unsafe impl Sync for HeapStorage {}

static HEAP_STORAGE: HeapStorage = HeapStorage {
    bytes: UnsafeCell::new([0; HEAP_SIZE]),
};

/// 전역 힙 할당자 (테스트 바이너리는 호스트 할당자를 사용)
#[cfg_attr(not(test), global_allocator)]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// 힙 할당자 초기화
///
/// 여러 번 호출해도 첫 호출만 적용됩니다 (테스트 러너가 커널 초기화 없이
/// 호출할 수 있어야 합니다).
pub fn init_once() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    unsafe {
        ALLOCATOR
            .lock()
            .init(HEAP_STORAGE.bytes.get() as *mut u8, HEAP_SIZE);
    }
}

/// 현재 힙의 시작 주소와 크기를 반환 (바이트)
pub fn heap_bounds() -> (usize, usize) {
    (HEAP_STORAGE.bytes.get() as usize, HEAP_SIZE)
}
