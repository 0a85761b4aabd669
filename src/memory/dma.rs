//! DMA 메모리 풀
//!
//! 이 모듈은 하드웨어(DMA)가 직접 읽고 쓰는 구조체를 위한 고정 크기 메모리 풀을
//! 제공합니다. UHCI 컨트롤러는 Transfer Descriptor, Queue Head, Setup Packet,
//! 보고서 버퍼를 물리 주소로 참조하므로, 이 풀에서 할당된 메모리만 하드웨어에
//! 전달할 수 있습니다.
//!
//! 풀은 16바이트 단위(chunk)로 관리되며, 할당은 항상 0으로 초기화됩니다.

use core::cell::UnsafeCell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::Mutex;

/// 풀 전체 크기 (바이트)
const POOL_SIZE: usize = 32 * 1024;
/// 할당 단위 (UHCI TD/QH는 16바이트 정렬을 요구)
const CHUNK_SIZE: usize = 16;
/// 총 chunk 수
const CHUNK_COUNT: usize = POOL_SIZE / CHUNK_SIZE;

/// DMA 풀 저장소 (4KB 정렬 - Frame List와 동일한 요구사항)
#[repr(C, align(4096))]
struct PoolStorage {
    bytes: UnsafeCell<[u8; POOL_SIZE]>,
}

// 접근은 아래 비트맵 뮤텍스로 직렬화됩니다.
unsafe impl Sync for PoolStorage {}

static POOL: PoolStorage = PoolStorage {
    bytes: UnsafeCell::new([0; POOL_SIZE]),
};

/// 풀의 물리 베이스 주소
///
/// 부팅 시 `init`으로 설정됩니다. 설정 전에는 기본값을 사용하므로
/// `virt_to_phys`/`phys_to_virt`의 왕복 변환은 항상 일관적입니다.
static POOL_PHYS_BASE: AtomicU32 = AtomicU32::new(0x0080_0000);

struct PoolState {
    /// chunk 사용 여부 비트맵 (1 = 사용 중)
    bitmap: [u64; CHUNK_COUNT / 64],
    /// 할당 시작 chunk에 기록되는 할당 길이 (chunk 단위, free에서 사용)
    run_len: [u16; CHUNK_COUNT],
}

static STATE: Mutex<PoolState> = Mutex::new(PoolState {
    bitmap: [0; CHUNK_COUNT / 64],
    run_len: [0; CHUNK_COUNT],
});

impl PoolState {
    fn is_used(&self, chunk: usize) -> bool {
        (self.bitmap[chunk / 64] >> (chunk % 64)) & 1 != 0
    }

    fn set_used(&mut self, chunk: usize, used: bool) {
        if used {
            self.bitmap[chunk / 64] |= 1 << (chunk % 64);
        } else {
            self.bitmap[chunk / 64] &= !(1 << (chunk % 64));
        }
    }
}

fn pool_base() -> *mut u8 {
    POOL.bytes.get() as *mut u8
}

/// DMA 풀 초기화
///
/// 커널 정적 데이터가 항등 매핑되어 있다는 가정 하에 풀의 물리 베이스 주소를
/// 기록합니다.
///
/// # Safety
/// 부팅 중 한 번만 호출되어야 합니다.
pub unsafe fn init() {
    let pool_phys_base = static_virt_to_phys(pool_base());
    POOL_PHYS_BASE.store(pool_phys_base, Ordering::SeqCst);
    crate::log_info!(
        "DMA pool: {} KB at phys 0x{:08X} ({} byte chunks)",
        POOL_SIZE / 1024,
        pool_phys_base,
        CHUNK_SIZE
    );
}

/// 커널 정적 데이터의 물리 주소 계산
///
/// Frame List처럼 풀 밖에 있는 정적 구조체에 사용됩니다. 부트로더가 커널을
/// 항등 매핑했다고 가정합니다 (원본 하드웨어 설정과 동일한 가정).
pub fn static_virt_to_phys(ptr: *const u8) -> u32 {
    ptr as usize as u32
}

/// DMA 풀에서 메모리 할당
///
/// 반환된 메모리는 0으로 초기화되며 `align` 바이트로 정렬됩니다.
/// 풀이 고갈되면 `None`을 반환합니다 (호출자는 `AllocationFailed`로 처리).
pub fn alloc(size: usize, align: usize) -> Option<NonNull<u8>> {
    if size == 0 || size > POOL_SIZE {
        return None;
    }
    let align_chunks = align.max(CHUNK_SIZE).div_ceil(CHUNK_SIZE);
    let need = size.div_ceil(CHUNK_SIZE);

    let mut state = STATE.lock();
    let mut start = 0usize;
    while start + need <= CHUNK_COUNT {
        // 정렬 경계에서만 시작
        if start % align_chunks != 0 {
            start += align_chunks - (start % align_chunks);
            continue;
        }
        let mut free = true;
        for c in start..start + need {
            if state.is_used(c) {
                free = false;
                start = c + 1;
                break;
            }
        }
        if free {
            for c in start..start + need {
                state.set_used(c, true);
            }
            state.run_len[start] = need as u16;
            let ptr = unsafe { pool_base().add(start * CHUNK_SIZE) };
            unsafe { core::ptr::write_bytes(ptr, 0, need * CHUNK_SIZE) };
            return NonNull::new(ptr);
        }
    }
    None
}

/// DMA 풀 메모리 해제
pub fn free(ptr: NonNull<u8>) {
    let offset = ptr.as_ptr() as usize - pool_base() as usize;
    if offset >= POOL_SIZE || offset % CHUNK_SIZE != 0 {
        crate::log_warn!("dma::free: pointer {:p} not from the DMA pool", ptr.as_ptr());
        return;
    }
    let start = offset / CHUNK_SIZE;

    let mut state = STATE.lock();
    let len = state.run_len[start] as usize;
    if len == 0 {
        crate::log_warn!("dma::free: double free or bad pointer {:p}", ptr.as_ptr());
        return;
    }
    for c in start..start + len {
        state.set_used(c, false);
    }
    state.run_len[start] = 0;
}

/// 풀 내부 가상 주소 → 물리 주소
pub fn virt_to_phys(ptr: *const u8) -> u32 {
    let offset = ptr as usize - pool_base() as usize;
    debug_assert!(offset < POOL_SIZE, "virt_to_phys: pointer outside DMA pool");
    POOL_PHYS_BASE.load(Ordering::Relaxed) + offset as u32
}

/// 물리 주소 → 풀 내부 가상 주소
pub fn phys_to_virt(phys: u32) -> *mut u8 {
    let offset = (phys - POOL_PHYS_BASE.load(Ordering::Relaxed)) as usize;
    debug_assert!(offset < POOL_SIZE, "phys_to_virt: address outside DMA pool");
    unsafe { pool_base().add(offset) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn alloc_is_aligned_and_zeroed() {
        let p = alloc(24, 16).unwrap();
        assert_eq!(p.as_ptr() as usize % 16, 0);
        for i in 0..24 {
            assert_eq!(unsafe { *p.as_ptr().add(i) }, 0);
        }
        free(p);
    }

    #[test_case]
    fn phys_roundtrip() {
        let p = alloc(8, 16).unwrap();
        let phys = virt_to_phys(p.as_ptr());
        assert_eq!(phys_to_virt(phys), p.as_ptr());
        free(p);
    }

    #[test_case]
    fn free_allows_reuse() {
        let a = alloc(4096, 4096).unwrap();
        free(a);
        let b = alloc(4096, 4096).unwrap();
        assert_eq!(a.as_ptr(), b.as_ptr());
        free(b);
    }

    #[test_case]
    fn exhaustion_returns_none() {
        // 풀보다 큰 요청은 즉시 실패해야 합니다.
        assert!(alloc(POOL_SIZE + 1, 16).is_none());
        assert!(alloc(0, 16).is_none());
    }
}
