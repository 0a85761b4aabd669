//! UHCI 제어 전송 엔진
//!
//! 표준 USB 제어 요청 하나를 동기적으로 실행합니다. SETUP / (DATA) / STATUS
//! TD 체인을 QH 하나에 depth-first로 연결하고, Frame List의 다음 두 슬롯에
//! 배치한 뒤 마지막 TD의 Active 비트가 클리어될 때까지 제한된 횟수만큼
//! 폴링합니다.
//!
//! 이 경로는 부팅 중 열거 컨텍스트에서만 호출되어야 합니다 (§재진입 불가).

use core::ptr::NonNull;

use super::hw::UhciIo;
use super::schedule::{FRAME_LIST, FRAME_LIST_ENTRIES};
use super::td::{
    self, build_token, classify_status, Pid, QueueHead, TransferDescriptor, TD_STATUS_ACTIVE,
    TD_STATUS_IOC, TD_STATUS_SPD,
};
use super::{UhciController, REG_USBSTS, STS_USBERRINT};
use crate::drivers::usb::descriptor::{ConfigurationDescriptor, DescriptorType, DeviceDescriptor};
use crate::drivers::usb::error::UsbError;
use crate::drivers::usb::host_controller::UsbHostController;
use crate::drivers::usb::request::UsbControlRequest;
use crate::memory::dma;

/// Active 비트 폴링 한도 (~1ms 단위)
pub const TRANSFER_TIMEOUT_MS: u32 = 3000;

/// SET_ADDRESS 후 디바이스가 새 주소를 적용하는 시간
const SET_ADDRESS_SETTLE_MS: u64 = 10;

/// 제어 전송의 DATA 단계
pub enum DataStage<'a> {
    /// DATA 단계 없음
    None,
    /// 디바이스 → 호스트
    In(&'a mut [u8]),
    /// 호스트 → 디바이스
    Out(&'a [u8]),
}

/// 전송 하나가 소유하는 일회성 DMA 객체들
///
/// 모든 종료 경로에서 스케줄 슬롯을 먼저 비우고 메모리를 해제합니다.
struct TransferChain {
    setup_buf: NonNull<u8>,
    data_buf: Option<(NonNull<u8>, usize)>,
    setup_td: NonNull<TransferDescriptor>,
    data_td: Option<NonNull<TransferDescriptor>>,
    status_td: NonNull<TransferDescriptor>,
    qh: NonNull<QueueHead>,
    slots: [usize; 2],
}

impl TransferChain {
    fn teardown(self) {
        FRAME_LIST.clear(self.slots[0]);
        FRAME_LIST.clear(self.slots[1]);
        td::free_td(self.setup_td);
        if let Some(data_td) = self.data_td {
            td::free_td(data_td);
        }
        td::free_td(self.status_td);
        td::free_qh(self.qh);
        dma::free(self.setup_buf);
        if let Some((buf, _)) = self.data_buf {
            dma::free(buf);
        }
    }
}

/// 제어 요청 하나 실행
///
/// 성공 시 IN 데이터는 `data` 슬라이스에 복사되어 있습니다.
pub fn execute_control<Io: UhciIo>(
    ctrl: &mut UhciController<Io>,
    device_address: u8,
    request: &UsbControlRequest,
    mut data: DataStage,
) -> Result<(), UsbError> {
    if !ctrl.is_running() {
        return Err(UsbError::NotInitialized);
    }

    let chain = build_chain(ctrl, device_address, request, &mut data)?;
    let result = wait_for_completion(ctrl, &chain);

    // 성공한 IN 전송: DMA 버퍼에서 호출자 버퍼로 복사
    if result.is_ok() {
        if let (DataStage::In(out), Some((buf, len))) = (&mut data, chain.data_buf) {
            let copy_len = (*out).len().min(len);
            unsafe {
                core::ptr::copy_nonoverlapping(buf.as_ptr(), out.as_mut_ptr(), copy_len);
            }
        }
    }

    chain.teardown();
    result
}

/// TD 체인 구성과 스케줄 배치
fn build_chain<Io: UhciIo>(
    ctrl: &mut UhciController<Io>,
    device_address: u8,
    request: &UsbControlRequest,
    data: &mut DataStage,
) -> Result<TransferChain, UsbError> {
    // SETUP 패킷 버퍼
    let setup_buf = dma::alloc(8, 16).ok_or(UsbError::AllocationFailed)?;
    let setup_bytes = request.to_bytes();
    unsafe {
        core::ptr::copy_nonoverlapping(setup_bytes.as_ptr(), setup_buf.as_ptr(), 8);
    }

    // DATA 버퍼 (OUT이면 호출자 데이터를 복사해 둠)
    let data_len = match data {
        DataStage::None => 0,
        DataStage::In(buf) => buf.len(),
        DataStage::Out(buf) => buf.len(),
    };
    let data_buf = if data_len > 0 {
        let buf = match dma::alloc(data_len, 16) {
            Some(b) => b,
            None => {
                dma::free(setup_buf);
                return Err(UsbError::AllocationFailed);
            }
        };
        if let DataStage::Out(src) = data {
            unsafe {
                core::ptr::copy_nonoverlapping(src.as_ptr(), buf.as_ptr(), data_len);
            }
        }
        Some((buf, data_len))
    } else {
        None
    };

    let free_bufs = |setup: NonNull<u8>, data: Option<(NonNull<u8>, usize)>| {
        dma::free(setup);
        if let Some((b, _)) = data {
            dma::free(b);
        }
    };

    // TD/QH 할당
    let setup_td = match td::alloc_td() {
        Ok(t) => t,
        Err(e) => {
            free_bufs(setup_buf, data_buf);
            return Err(e);
        }
    };
    let data_td = if data_buf.is_some() {
        match td::alloc_td() {
            Ok(t) => Some(t),
            Err(e) => {
                td::free_td(setup_td);
                free_bufs(setup_buf, data_buf);
                return Err(e);
            }
        }
    } else {
        None
    };
    let status_td = match td::alloc_td() {
        Ok(t) => t,
        Err(e) => {
            td::free_td(setup_td);
            if let Some(t) = data_td {
                td::free_td(t);
            }
            free_bufs(setup_buf, data_buf);
            return Err(e);
        }
    };
    let qh = match td::alloc_qh() {
        Ok(q) => q,
        Err(e) => {
            td::free_td(setup_td);
            if let Some(t) = data_td {
                td::free_td(t);
            }
            td::free_td(status_td);
            free_bufs(setup_buf, data_buf);
            return Err(e);
        }
    };

    // SETUP TD: PID=SETUP, 토글 0, 8바이트
    {
        let td_ref = unsafe { setup_td.as_ref() };
        let next_phys = match data_td {
            Some(t) => td::td_phys(t),
            None => td::td_phys(status_td),
        };
        td_ref.set_link_td(next_phys);
        td_ref.set_token(build_token(Pid::Setup, device_address, 0, false, 8));
        td_ref.set_buffer(dma::virt_to_phys(setup_buf.as_ptr()));
        td_ref.set_control_status(TD_STATUS_ACTIVE);
    }

    // DATA TD: 토글 1, IN은 Short Packet Detect 허용
    if let (Some(data_td), Some((buf, len))) = (data_td, data_buf) {
        let td_ref = unsafe { data_td.as_ref() };
        let pid = if request.is_device_to_host() {
            Pid::In
        } else {
            Pid::Out
        };
        td_ref.set_link_td(td::td_phys(status_td));
        td_ref.set_token(build_token(pid, device_address, 0, true, len as u16));
        td_ref.set_buffer(dma::virt_to_phys(buf.as_ptr()));
        let mut status = TD_STATUS_ACTIVE;
        if request.is_device_to_host() {
            status |= TD_STATUS_SPD;
        }
        td_ref.set_control_status(status);
    }

    // STATUS TD: DATA 단계의 반대 방향, 길이 0, 토글 1, IOC
    {
        let td_ref = unsafe { status_td.as_ref() };
        let pid = if request.is_device_to_host() {
            Pid::Out
        } else {
            Pid::In
        };
        td_ref.set_link_terminate();
        td_ref.set_token(build_token(pid, device_address, 0, true, 0));
        td_ref.set_buffer(0);
        td_ref.set_control_status(TD_STATUS_ACTIVE | TD_STATUS_IOC);
    }

    // QH: 수평 terminate, 수직 → SETUP TD
    {
        let qh_ref = unsafe { qh.as_ref() };
        qh_ref.set_horizontal_terminate();
        qh_ref.set_vertical_td(td::td_phys(setup_td));
    }

    // 하드웨어가 곧 소비할 엔트리와 경합하지 않도록 현재 프레임의 다음 두
    // 슬롯에 배치
    let current = ctrl.current_frame() as usize;
    let slots = [
        (current + 1) % FRAME_LIST_ENTRIES,
        (current + 2) % FRAME_LIST_ENTRIES,
    ];
    let qh_addr = td::qh_phys(qh);
    FRAME_LIST.place(slots[0], qh_addr);
    FRAME_LIST.place(slots[1], qh_addr);

    Ok(TransferChain {
        setup_buf,
        data_buf,
        setup_td,
        data_td,
        status_td,
        qh,
        slots,
    })
}

/// 마지막 TD의 Active 비트를 제한된 횟수만큼 폴링
///
/// 도중에 앞선 TD가 에러로 비활성화되면 그 에러를 즉시 보고합니다.
/// 대기 중 발생한 에러 인터럽트 상태는 확인 후 다시 써서 클리어합니다.
fn wait_for_completion<Io: UhciIo>(
    ctrl: &mut UhciController<Io>,
    chain: &TransferChain,
) -> Result<(), UsbError> {
    let last_td = unsafe { chain.status_td.as_ref() };

    for _ in 0..TRANSFER_TIMEOUT_MS {
        if !last_td.is_active() {
            return classify_status(last_td.control_status());
        }

        // 체인 중간에서 멈춘 에러 확인
        for td_ptr in [Some(chain.setup_td), chain.data_td].into_iter().flatten() {
            let td_ref = unsafe { td_ptr.as_ref() };
            let status = td_ref.control_status();
            if status & TD_STATUS_ACTIVE == 0 {
                classify_status(status)?;
            }
        }

        // 폴링 중 에러 인터럽트 상태 비트 클리어 (인터럽트 핸들러가 아직
        // 설치되지 않았을 수 있음)
        let sts = ctrl.io_mut().read16(REG_USBSTS);
        if sts & STS_USBERRINT != 0 {
            ctrl.io_mut().write16(REG_USBSTS, STS_USBERRINT);
        }

        ctrl.io_mut().delay_ms(1);
    }

    crate::log_warn!(
        "UHCI: control transfer timeout (device {})",
        unsafe { chain.setup_td.as_ref() }.token() >> 8 & 0x7F
    );
    Err(UsbError::TransferTimeout)
}

/// SET_ADDRESS 실행
///
/// 성공 후 디바이스가 새 주소를 적용할 시간을 줍니다.
pub fn set_device_address<Io: UhciIo>(
    ctrl: &mut UhciController<Io>,
    address: u8,
) -> Result<(), UsbError> {
    let request = UsbControlRequest::new_set_address(address);
    execute_control(ctrl, 0, &request, DataStage::None)?;
    ctrl.io_mut().delay_ms(SET_ADDRESS_SETTLE_MS);
    Ok(())
}

/// 18바이트 디바이스 디스크립터 읽기
pub fn get_device_descriptor<Io: UhciIo>(
    ctrl: &mut UhciController<Io>,
    device_address: u8,
) -> Result<DeviceDescriptor, UsbError> {
    let mut buf = [0u8; 18];
    let request = UsbControlRequest::new_get_descriptor(DescriptorType::Device, 0, 0, 18);
    execute_control(ctrl, device_address, &request, DataStage::In(&mut buf))?;

    let descriptor: DeviceDescriptor =
        unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const DeviceDescriptor) };
    if descriptor.length < 18 || descriptor.descriptor_type != DescriptorType::Device as u8 {
        return Err(UsbError::InvalidDescriptor);
    }
    Ok(descriptor)
}

/// 9바이트 구성 디스크립터 헤더 읽기 (total_length 파악용)
pub fn get_configuration_descriptor<Io: UhciIo>(
    ctrl: &mut UhciController<Io>,
    device_address: u8,
) -> Result<ConfigurationDescriptor, UsbError> {
    let mut buf = [0u8; 9];
    let request = UsbControlRequest::new_get_descriptor(DescriptorType::Configuration, 0, 0, 9);
    execute_control(ctrl, device_address, &request, DataStage::In(&mut buf))?;

    let descriptor: ConfigurationDescriptor =
        unsafe { core::ptr::read_unaligned(buf.as_ptr() as *const ConfigurationDescriptor) };
    if descriptor.length < 9
        || descriptor.descriptor_type != DescriptorType::Configuration as u8
    {
        return Err(UsbError::InvalidDescriptor);
    }
    Ok(descriptor)
}

/// 전체 구성 디스크립터 blob 읽기
///
/// `buf` 길이는 헤더의 total_length여야 합니다.
pub fn get_full_configuration_descriptor<Io: UhciIo>(
    ctrl: &mut UhciController<Io>,
    device_address: u8,
    buf: &mut [u8],
) -> Result<(), UsbError> {
    let request = UsbControlRequest::new_get_descriptor(
        DescriptorType::Configuration,
        0,
        0,
        buf.len() as u16,
    );
    execute_control(ctrl, device_address, &request, DataStage::In(buf))
}

/// SET_CONFIGURATION 실행
pub fn set_configuration<Io: UhciIo>(
    ctrl: &mut UhciController<Io>,
    device_address: u8,
    configuration_value: u8,
) -> Result<(), UsbError> {
    let request = UsbControlRequest::new_set_configuration(configuration_value);
    execute_control(ctrl, device_address, &request, DataStage::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::usb::uhci::sim::SimController;

    #[test_case]
    fn rejects_when_not_running() {
        let mut ctrl = UhciController::with_io(SimController::new_empty());
        let request = UsbControlRequest::new_set_address(1);
        let result = execute_control(&mut ctrl, 0, &request, DataStage::None);
        assert_eq!(result, Err(UsbError::NotInitialized));
    }

    #[test_case]
    fn stuck_hardware_times_out() {
        // 스케줄을 실행하지 않는 시뮬레이터: Active가 영원히 남음
        let mut ctrl = UhciController::with_io(SimController::new_stuck());
        ctrl.init().unwrap();

        let request = UsbControlRequest::new_set_address(1);
        let result = execute_control(&mut ctrl, 0, &request, DataStage::None);
        assert_eq!(result, Err(UsbError::TransferTimeout));

        // 타임아웃 후에도 스케줄 슬롯은 비워져 있어야 함
        for slot in 0..FRAME_LIST_ENTRIES {
            assert_eq!(FRAME_LIST.entry(slot), super::super::LINK_TERMINATE);
        }
    }

    #[test_case]
    fn device_descriptor_fetch_roundtrip() {
        let mut ctrl = UhciController::with_io(SimController::new_boot_keyboard());
        ctrl.init().unwrap();

        set_device_address(&mut ctrl, 1).unwrap();
        let descriptor = get_device_descriptor(&mut ctrl, 1).unwrap();
        assert_eq!(descriptor.length, 18);
        let vid = descriptor.vendor_id;
        assert_eq!(vid, crate::drivers::usb::uhci::sim::SIM_VENDOR_ID);
    }
}
