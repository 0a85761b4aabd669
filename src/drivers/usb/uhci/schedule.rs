//! UHCI Frame List 스케줄러
//!
//! 컨트롤러는 1ms마다 Frame List의 엔트리 하나를 소비합니다. 엔트리는
//! terminate 마커이거나 QH의 물리 주소(QH select 비트 포함)입니다.
//! 엔트리 `i`는 1024 프레임마다 다시 방문됩니다.

use core::cell::UnsafeCell;

use super::{LINK_QH_SELECT, LINK_TERMINATE};
use crate::memory::dma;

/// Frame List 엔트리 수 (하드웨어 고정)
pub const FRAME_LIST_ENTRIES: usize = 1024;

/// 1024개의 32비트 엔트리, 4096바이트 정렬 (하드웨어 요구사항)
#[repr(C, align(4096))]
pub struct FrameList {
    entries: UnsafeCell<[u32; FRAME_LIST_ENTRIES]>,
}

// 하드웨어가 DMA로 읽는 동안 소프트웨어는 개별 엔트리를 volatile로만
// 접근합니다. 엔트리 단위 32비트 쓰기는 원자적입니다.
unsafe impl Sync for FrameList {}

impl FrameList {
    pub const fn new() -> Self {
        Self {
            entries: UnsafeCell::new([LINK_TERMINATE; FRAME_LIST_ENTRIES]),
        }
    }

    fn entry_ptr(&self, slot: usize) -> *mut u32 {
        debug_assert!(slot < FRAME_LIST_ENTRIES);
        unsafe { (self.entries.get() as *mut u32).add(slot) }
    }

    /// 슬롯에 QH 물리 주소 배치
    pub fn place(&self, slot: usize, qh_phys: u32) {
        unsafe {
            core::ptr::write_volatile(self.entry_ptr(slot), qh_phys | LINK_QH_SELECT);
        }
    }

    /// 슬롯을 terminate 마커로 복원
    ///
    /// 해제된 메모리를 가리키는 엔트리를 남기지 않기 위해 QH를 해제하기
    /// 전에 반드시 호출되어야 합니다.
    pub fn clear(&self, slot: usize) {
        unsafe {
            core::ptr::write_volatile(self.entry_ptr(slot), LINK_TERMINATE);
        }
    }

    /// 슬롯의 현재 값 읽기
    pub fn entry(&self, slot: usize) -> u32 {
        unsafe { core::ptr::read_volatile(self.entry_ptr(slot)) }
    }

    /// 모든 엔트리를 terminate로 초기화 (컨트롤러 시작 전)
    pub fn reset_all(&self) {
        for slot in 0..FRAME_LIST_ENTRIES {
            self.clear(slot);
        }
    }

    /// Frame List의 물리 베이스 주소
    ///
    /// 커널 정적 데이터 항등 매핑 가정을 사용합니다 (FLBASEADD에 기록).
    pub fn phys_base(&self) -> u32 {
        dma::static_virt_to_phys(self.entries.get() as *const u8)
    }
}

/// 전역 Frame List (컨트롤러 수명 동안 유지)
pub static FRAME_LIST: FrameList = FrameList::new();

/// 주기 파이프가 차지하는 슬롯 집합의 반복자
///
/// `start`에서 시작하여 `interval` 프레임 간격으로 진행하고, 시작 슬롯에
/// 다시 도달하면 멈춥니다. interval은 최소 1로 보정됩니다 (0이면 무한
/// 루프가 되므로).
pub struct PeriodicSlots {
    start: usize,
    interval: usize,
    current: usize,
    first: bool,
}

impl PeriodicSlots {
    pub fn new(start: usize, interval: usize) -> Self {
        Self {
            start: start % FRAME_LIST_ENTRIES,
            interval: interval.max(1),
            current: start % FRAME_LIST_ENTRIES,
            first: true,
        }
    }
}

impl Iterator for PeriodicSlots {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if !self.first && self.current == self.start {
            return None;
        }
        let slot = self.current;
        self.first = false;
        self.current = (self.current + self.interval) % FRAME_LIST_ENTRIES;
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn place_then_clear_restores_terminate() {
        let slot = 17;
        FRAME_LIST.place(slot, 0x0080_1000);
        assert_eq!(FRAME_LIST.entry(slot), 0x0080_1000 | LINK_QH_SELECT);
        FRAME_LIST.clear(slot);
        assert_eq!(FRAME_LIST.entry(slot), LINK_TERMINATE);
    }

    #[test_case]
    fn periodic_slots_cover_exact_set() {
        // interval 8, start 4: 4, 12, 20, ... 1020 (128개)
        let slots: alloc::vec::Vec<usize> = PeriodicSlots::new(4, 8).collect();
        assert_eq!(slots.len(), 128);
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(*slot, (4 + i * 8) % FRAME_LIST_ENTRIES);
        }
    }

    #[test_case]
    fn periodic_slots_interval_larger_than_table() {
        // 1024와 서로소가 아닌 긴 간격도 시작 슬롯 재방문 시 종료
        let slots: alloc::vec::Vec<usize> = PeriodicSlots::new(0, 512).collect();
        assert_eq!(slots, alloc::vec![0, 512]);
    }

    #[test_case]
    fn zero_interval_is_clamped() {
        let slots: alloc::vec::Vec<usize> = PeriodicSlots::new(10, 0).collect();
        assert_eq!(slots.len(), FRAME_LIST_ENTRIES);
    }
}
