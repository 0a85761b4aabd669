//! 주기적 인터럽트 IN 파이프 관리자
//!
//! 파이프 하나는 영속적인 8바이트 버퍼, TD, QH를 소유하고 Frame List의
//! 고정 간격 슬롯들에 자신의 QH를 배치합니다. 매 완료마다 TD를 제자리에서
//! 재무장(rearm)하며 재할당하지 않습니다.
//!
//! `service()`는 인터럽트 컨텍스트에서 호출될 수 있는 유일한 경로입니다.
//! 블로킹하지 않고, 할당하지 않으며, 제어 전송 엔진을 호출하지 않습니다.

use core::ptr::NonNull;

use spin::Mutex;

use super::hw::UhciIo;
use super::schedule::{PeriodicSlots, FRAME_LIST, FRAME_LIST_ENTRIES};
use super::td::{
    self, build_token, classify_status, Pid, QueueHead, TransferDescriptor, TD_ACTLEN_MASK,
    TD_STATUS_ACTIVE, TD_STATUS_IOC, TD_STATUS_SPD,
};
use super::UhciController;
use crate::drivers::usb::error::UsbError;
use crate::memory::dma;

/// 동시에 열 수 있는 인터럽트 파이프 수
pub const MAX_INTERRUPT_PIPES: usize = 4;

/// 부트 키보드 보고서 크기 (파이프 버퍼 크기)
const REPORT_SIZE: usize = 8;

/// 재무장 시 기록하는 control_status 값
const ARMED_STATUS: u32 = TD_ACTLEN_MASK | TD_STATUS_SPD | TD_STATUS_IOC | TD_STATUS_ACTIVE;

/// 열린 인터럽트 파이프 하나의 영속 상태
pub struct InterruptPipe {
    device_address: u8,
    endpoint: u8,
    interval: usize,
    toggle: bool,
    first_slot: usize,
    /// 키보드 이벤트 계층에 전달하는 소비자 식별자
    consumer_id: u8,
    buffer: NonNull<u8>,
    td: NonNull<TransferDescriptor>,
    qh: NonNull<QueueHead>,
}

// 포인터는 DMA 풀 내부만 가리키고 접근은 PIPES 뮤텍스로 직렬화됩니다.
unsafe impl Send for InterruptPipe {}

static PIPES: Mutex<[Option<InterruptPipe>; MAX_INTERRUPT_PIPES]> =
    Mutex::new([None, None, None, None]);

/// 파이프 테이블 잠금
///
/// 비인터럽트 컨텍스트에서는 인터럽트를 막은 채 잠가서 ISR의 `service()`와
/// 데드락이 생기지 않도록 합니다.
#[cfg(not(test))]
fn with_pipes<R>(f: impl FnOnce(&mut [Option<InterruptPipe>; MAX_INTERRUPT_PIPES]) -> R) -> R {
    x86_64::instructions::interrupts::without_interrupts(|| f(&mut PIPES.lock()))
}

#[cfg(test)]
fn with_pipes<R>(f: impl FnOnce(&mut [Option<InterruptPipe>; MAX_INTERRUPT_PIPES]) -> R) -> R {
    f(&mut PIPES.lock())
}

/// TD를 (다시) 무장
///
/// 토큰을 현재 토글로 재구성하고, Active/IOC/SPD를 설정하며, QH의 수직
/// 링크를 TD로 복원합니다 (클리어되어 있을 수 있음).
fn arm(pipe: &InterruptPipe) {
    let td_ref = unsafe { pipe.td.as_ref() };
    let qh_ref = unsafe { pipe.qh.as_ref() };

    td_ref.set_link_terminate();
    td_ref.set_token(build_token(
        Pid::In,
        pipe.device_address,
        pipe.endpoint,
        pipe.toggle,
        REPORT_SIZE as u16,
    ));
    td_ref.set_buffer(dma::virt_to_phys(pipe.buffer.as_ptr()));
    td_ref.set_control_status(ARMED_STATUS);
    qh_ref.set_vertical_td(td::td_phys(pipe.td));
}

/// 인터럽트 IN 파이프 열기
///
/// 버퍼/TD/QH를 할당하고 현재 프레임의 다음 슬롯부터 `interval` 간격으로
/// QH를 스케줄합니다. 성공 시 파이프 핸들(테이블 인덱스)을 반환합니다.
pub fn open<Io: UhciIo>(
    ctrl: &mut UhciController<Io>,
    device_address: u8,
    endpoint_address: u8,
    interval_frames: u8,
    consumer_id: u8,
) -> Result<usize, UsbError> {
    let endpoint = endpoint_address & 0x0F;
    let interval = (interval_frames as usize).max(1);

    let buffer = dma::alloc(REPORT_SIZE, 16).ok_or(UsbError::AllocationFailed)?;
    let td = match td::alloc_td() {
        Ok(t) => t,
        Err(e) => {
            dma::free(buffer);
            return Err(e);
        }
    };
    let qh = match td::alloc_qh() {
        Ok(q) => q,
        Err(e) => {
            td::free_td(td);
            dma::free(buffer);
            return Err(e);
        }
    };

    let first_slot = (ctrl.current_frame() as usize + 1) % FRAME_LIST_ENTRIES;
    let pipe = InterruptPipe {
        device_address,
        endpoint,
        interval,
        toggle: false,
        first_slot,
        consumer_id,
        buffer,
        td,
        qh,
    };

    unsafe { pipe.qh.as_ref() }.set_horizontal_terminate();
    arm(&pipe);

    let qh_addr = td::qh_phys(qh);

    with_pipes(|pipes| {
        let slot_index = match pipes.iter().position(|p| p.is_none()) {
            Some(i) => i,
            None => {
                td::free_td(td);
                td::free_qh(qh);
                dma::free(buffer);
                return Err(UsbError::PipeTableFull);
            }
        };

        for frame_slot in PeriodicSlots::new(first_slot, interval) {
            FRAME_LIST.place(frame_slot, qh_addr);
        }

        crate::log_info!(
            "UHCI: interrupt pipe open (device {}, EP {}, every {} frame(s), slot {})",
            device_address,
            endpoint,
            interval,
            slot_index
        );
        pipes[slot_index] = Some(pipe);
        Ok(slot_index)
    })
}

/// 파이프 닫기
///
/// 차지하던 모든 스케줄 슬롯을 terminate로 복원한 뒤 메모리를 해제합니다.
pub fn close(handle: usize) {
    with_pipes(|pipes| {
        let pipe = match pipes.get_mut(handle).and_then(Option::take) {
            Some(p) => p,
            None => return,
        };

        for frame_slot in PeriodicSlots::new(pipe.first_slot, pipe.interval) {
            FRAME_LIST.clear(frame_slot);
        }

        td::free_td(pipe.td);
        td::free_qh(pipe.qh);
        dma::free(pipe.buffer);
        crate::log_debug!("UHCI: interrupt pipe {} closed", handle);
    });
}

/// 디바이스의 모든 파이프 닫기
pub fn close_device(device_address: u8) {
    for handle in 0..MAX_INTERRUPT_PIPES {
        let matches = with_pipes(|pipes| {
            pipes[handle]
                .as_ref()
                .map(|p| p.device_address == device_address)
                .unwrap_or(false)
        });
        if matches {
            close(handle);
        }
    }
}

/// 완료 스윕
///
/// 열린 모든 파이프에 대해: Active가 아직 설정되어 있으면 전송 미완료로
/// 건너뜁니다. NAK이면 토글을 유지한 채 재무장합니다. 다른 에러면 경고를
/// 남기고 토글을 유지한 채 재무장합니다. 성공이면 보고서를 소비자에게
/// 전달하고 토글을 뒤집어 재무장합니다.
pub fn service() {
    with_pipes(|pipes| {
        for pipe in pipes.iter_mut().flatten() {
            let td_ref = unsafe { pipe.td.as_ref() };
            let status = td_ref.control_status();

            if status & TD_STATUS_ACTIVE != 0 {
                continue; // 아직 하드웨어 소유
            }

            match classify_status(status) {
                Err(UsbError::Nak) => {
                    // 데이터 없음: 토글 유지
                    arm(pipe);
                }
                Err(e) => {
                    crate::log_warn!(
                        "UHCI: interrupt pipe error on device {} EP {}: {}",
                        pipe.device_address,
                        pipe.endpoint,
                        e
                    );
                    arm(pipe);
                }
                Ok(()) => {
                    let mut report = [0u8; REPORT_SIZE];
                    unsafe {
                        core::ptr::copy_nonoverlapping(
                            pipe.buffer.as_ptr(),
                            report.as_mut_ptr(),
                            REPORT_SIZE,
                        );
                    }
                    crate::drivers::keyboard::on_boot_report(pipe.consumer_id, &report);
                    pipe.toggle = !pipe.toggle;
                    arm(pipe);
                }
            }
        }
    });
}

/// 열린 파이프 수
pub fn open_count() -> usize {
    with_pipes(|pipes| pipes.iter().filter(|p| p.is_some()).count())
}

#[cfg(test)]
pub(crate) fn pipe_placement(handle: usize) -> Option<(usize, usize, u8, u8)> {
    with_pipes(|pipes| {
        pipes[handle]
            .as_ref()
            .map(|p| (p.first_slot, p.interval, p.device_address, p.endpoint))
    })
}

#[cfg(test)]
pub(crate) fn pipe_toggle(handle: usize) -> Option<bool> {
    with_pipes(|pipes| pipes[handle].as_ref().map(|p| p.toggle))
}

#[cfg(test)]
pub(crate) fn with_pipe_td<R>(handle: usize, f: impl FnOnce(&TransferDescriptor) -> R) -> Option<R> {
    with_pipes(|pipes| {
        pipes[handle]
            .as_ref()
            .map(|p| f(unsafe { p.td.as_ref() }))
    })
}

#[cfg(test)]
pub(crate) fn write_pipe_report(handle: usize, report: &[u8; REPORT_SIZE]) {
    with_pipes(|pipes| {
        if let Some(p) = pipes[handle].as_ref() {
            unsafe {
                core::ptr::copy_nonoverlapping(report.as_ptr(), p.buffer.as_ptr(), REPORT_SIZE);
            }
        }
    });
}
