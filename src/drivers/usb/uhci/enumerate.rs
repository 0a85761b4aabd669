//! USB 디바이스 열거
//!
//! 새로 연결된 디바이스를 "포트 리셋"에서 "구성 완료"까지 진행시킵니다.
//! 모든 단계는 제어 전송 엔진 위에서 동작하며, 한 포트의 실패는 해당
//! 포트만 중단시킵니다.

use alloc::vec;

use super::hw::UhciIo;
use super::{pipe, transfer, UhciController, PORTSC_CONNECT, PORTSC_ENABLE, PORTSC_RESET, REG_PORTSC_BASE};
use crate::drivers::keyboard;
use crate::drivers::usb::descriptor::{self, ParsedConfiguration};
use crate::drivers::usb::device::{EnumerationStage, UsbDevice};
use crate::drivers::usb::error::UsbError;

/// 루트 포트 리셋
///
/// 리셋 비트 설정 → 50ms → 해제 → 50ms → 포트 활성화 → 10ms 후 연결과
/// 활성화 상태를 확인합니다. 디바이스가 없으면 `DeviceNotFound`.
pub fn reset_port<Io: UhciIo>(ctrl: &mut UhciController<Io>, port: u8) -> Result<(), UsbError> {
    let portsc = REG_PORTSC_BASE + 2 * port as u16;
    let io = ctrl.io_mut();

    io.write16(portsc, PORTSC_RESET);
    io.delay_ms(50);
    io.write16(portsc, 0);
    io.delay_ms(50);
    io.write16(portsc, PORTSC_ENABLE);
    io.delay_ms(10);

    let status = io.read16(portsc);
    if status & PORTSC_CONNECT == 0 || status & PORTSC_ENABLE == 0 {
        return Err(UsbError::DeviceNotFound);
    }
    Ok(())
}

/// 포트 하나의 디바이스를 열거
///
/// 상태 전이: PortReset → AddressAssigned → DeviceDescribed →
/// ConfigDiscovered → ConfigParsed → Configured → (PipeOpened).
/// 주소는 `포트 번호 + 1`로 할당합니다 (컨트롤러가 하나라는 가정의 알려진
/// 한계).
pub fn enumerate_port<Io: UhciIo>(
    ctrl: &mut UhciController<Io>,
    port: u8,
) -> Result<UsbDevice, UsbError> {
    reset_port(ctrl, port)?;

    let address = port + 1;
    let mut device = UsbDevice::new(address, port);
    crate::log_info!("UHCI: device detected on port {}, assigning address {}", port, address);

    transfer::set_device_address(ctrl, address).map_err(|e| {
        crate::log_warn!("UHCI: SET_ADDRESS failed on port {}: {}", port, e);
        UsbError::EnumerationFailed
    })?;
    device.set_stage(EnumerationStage::AddressAssigned);

    let device_descriptor = transfer::get_device_descriptor(ctrl, address)?;
    device.set_device_descriptor(device_descriptor);
    device.set_stage(EnumerationStage::DeviceDescribed);
    {
        let vid = device_descriptor.vendor_id;
        let pid = device_descriptor.product_id;
        crate::log_info!(
            "UHCI: device {}: VID=0x{:04X} PID=0x{:04X} class=0x{:02X}",
            address,
            vid,
            pid,
            device_descriptor.device_class
        );
    }

    // 헤더만 먼저 읽어 전체 blob 크기를 파악한 뒤 그 크기만큼 할당
    let config_header = transfer::get_configuration_descriptor(ctrl, address)?;
    let total_length = config_header.total_length as usize;
    if total_length < config_header.length as usize {
        return Err(UsbError::InvalidDescriptor);
    }

    let mut blob = vec![0u8; total_length];
    transfer::get_full_configuration_descriptor(ctrl, address, &mut blob)?;
    device.set_configuration_descriptor(config_header);
    device.set_stage(EnumerationStage::ConfigDiscovered);

    #[cfg(feature = "config_dump")]
    dump_config_blob(address, &blob);

    let parsed: ParsedConfiguration = descriptor::parse_configuration(&blob)?;
    device.set_interface_descriptor(parsed.interface);
    if let Some(endpoint) = parsed.endpoint {
        device.set_endpoint_descriptor(endpoint);
    }
    device.set_stage(EnumerationStage::ConfigParsed);

    let config_value = parsed.configuration.configuration_value;
    transfer::set_configuration(ctrl, address, config_value)?;
    device.set_stage(EnumerationStage::Configured);

    // HID 부트 키보드라면 주기 파이프를 열어 입력 폴링 시작
    if parsed.is_boot_keyboard {
        if let Some(endpoint) = parsed.endpoint {
            if keyboard::register_boot_keyboard(address).is_none() {
                // 등록 실패 시 보고서를 받을 곳이 없으므로 파이프도 열지 않음
                crate::log_warn!(
                    "UHCI: keyboard table full, device {} stays without input pipe",
                    address
                );
            } else {
                match pipe::open(
                    ctrl,
                    address,
                    endpoint.endpoint_address,
                    endpoint.interval,
                    address,
                ) {
                    Ok(_) => device.set_stage(EnumerationStage::PipeOpened),
                    Err(e) => {
                        keyboard::unregister_boot_keyboard(address);
                        crate::log_warn!(
                            "UHCI: failed to open interrupt pipe for device {}: {}",
                            address,
                            e
                        );
                    }
                }
            }
        } else {
            crate::log_warn!(
                "UHCI: boot keyboard on device {} has no interrupt IN endpoint",
                address
            );
        }
    }

    log_enumeration_summary(&device);
    Ok(device)
}

fn log_enumeration_summary(device: &UsbDevice) {
    let interface = device.interface_descriptor();
    let endpoint = device.endpoint_descriptor();
    crate::log_info!(
        "UHCI: port {} enumerated: address={} stage={:?} class={:?} maxpkt={} interface={} endpoint={}",
        device.port(),
        device.address(),
        device.stage(),
        device.class_code(),
        device.max_packet_size(),
        interface.map(|i| i.interface_number).unwrap_or(0xFF),
        endpoint.map(|e| e.endpoint_number()).unwrap_or(0xFF)
    );
}

#[cfg(feature = "config_dump")]
fn dump_config_blob(address: u8, blob: &[u8]) {
    crate::log_debug!("UHCI: configuration blob for device {} ({} bytes):", address, blob.len());
    for chunk in blob.chunks(16) {
        let mut line = [0u8; 48];
        let mut pos = 0;
        for byte in chunk {
            let hex = b"0123456789ABCDEF";
            line[pos] = hex[(byte >> 4) as usize];
            line[pos + 1] = hex[(byte & 0xF) as usize];
            line[pos + 2] = b' ';
            pos += 3;
        }
        if let Ok(s) = core::str::from_utf8(&line[..pos]) {
            crate::log_debug!("  {}", s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::usb::uhci::sim::SimController;
    use crate::drivers::usb::uhci::NUM_ROOT_PORTS;
    use crate::drivers::usb::UsbClassCode;

    #[test_case]
    fn boot_keyboard_enumerates_to_pipe_opened() {
        let mut ctrl = UhciController::with_io(SimController::new_boot_keyboard());
        crate::drivers::usb::host_controller::UsbHostController::init(&mut ctrl).unwrap();

        let device = enumerate_port(&mut ctrl, 0).unwrap();
        assert_eq!(device.address(), 1);
        assert_eq!(device.stage(), EnumerationStage::PipeOpened);
        assert_eq!(device.class_code(), UsbClassCode::Hid);

        let endpoint = device.endpoint_descriptor().unwrap();
        assert_eq!(endpoint.endpoint_number(), 1);
        assert_eq!(endpoint.interval, 10);

        // 파이프가 해당 디바이스/엔드포인트/간격으로 열렸는지 확인
        assert_eq!(pipe::open_count(), 1);
        let (_, interval, dev_addr, ep) = pipe::pipe_placement(0).unwrap();
        assert_eq!(interval, 10);
        assert_eq!(dev_addr, 1);
        assert_eq!(ep, 1);

        // 시뮬레이터가 관측한 요청 순서 확인
        assert!(ctrl.io_mut().saw_set_address(1));
        assert!(ctrl.io_mut().saw_set_configuration(1));

        pipe::close_device(1);
        keyboard::unregister_boot_keyboard(1);
    }

    #[test_case]
    fn long_config_blob_enumerates_fully() {
        // 인터페이스/엔드포인트 디스크립터가 blob의 256바이트 이후에 있어도
        // total_length만큼 읽어 열거가 끝까지 진행되어야 함
        let mut ctrl = UhciController::with_io(SimController::new_vendor_padded_keyboard());
        crate::drivers::usb::host_controller::UsbHostController::init(&mut ctrl).unwrap();

        let device = enumerate_port(&mut ctrl, 0).unwrap();
        assert_eq!(device.stage(), EnumerationStage::PipeOpened);
        assert_eq!(device.class_code(), UsbClassCode::Hid);

        let endpoint = device.endpoint_descriptor().unwrap();
        assert_eq!(endpoint.endpoint_number(), 1);
        assert_eq!(endpoint.interval, 10);

        pipe::close_device(1);
        keyboard::unregister_boot_keyboard(1);
    }

    #[test_case]
    fn full_keyboard_table_leaves_pipe_closed() {
        // 키보드 테이블이 가득 차면 파이프를 열지 않고 Configured에 머묾
        for i in 0..keyboard::MAX_BOOT_KEYBOARDS {
            assert!(keyboard::register_boot_keyboard(200 + i as u8).is_some());
        }

        let mut ctrl = UhciController::with_io(SimController::new_boot_keyboard());
        crate::drivers::usb::host_controller::UsbHostController::init(&mut ctrl).unwrap();

        let device = enumerate_port(&mut ctrl, 0).unwrap();
        assert_eq!(device.stage(), EnumerationStage::Configured);
        assert_eq!(pipe::open_count(), 0);

        for i in 0..keyboard::MAX_BOOT_KEYBOARDS {
            keyboard::unregister_boot_keyboard(200 + i as u8);
        }
    }

    #[test_case]
    fn unresponsive_device_reports_enumeration_failure() {
        // 연결은 보이지만 어떤 전송에도 응답하지 않는 디바이스
        let mut ctrl = UhciController::with_io(SimController::new_stuck());
        crate::drivers::usb::host_controller::UsbHostController::init(&mut ctrl).unwrap();

        assert_eq!(
            enumerate_port(&mut ctrl, 0).unwrap_err(),
            UsbError::EnumerationFailed
        );
    }

    #[test_case]
    fn mass_storage_stops_at_configured() {
        let mut ctrl = UhciController::with_io(SimController::new_mass_storage());
        crate::drivers::usb::host_controller::UsbHostController::init(&mut ctrl).unwrap();

        let device = enumerate_port(&mut ctrl, 0).unwrap();
        assert_eq!(device.stage(), EnumerationStage::Configured);
        assert_eq!(device.class_code(), UsbClassCode::MassStorage);
        assert!(device.endpoint_descriptor().is_none());
        assert_eq!(pipe::open_count(), 0);
    }

    #[test_case]
    fn empty_port_reports_no_device() {
        let mut ctrl = UhciController::with_io(SimController::new_boot_keyboard());
        crate::drivers::usb::host_controller::UsbHostController::init(&mut ctrl).unwrap();

        // 시뮬레이터는 포트 0에만 디바이스를 연결
        for port in 1..NUM_ROOT_PORTS {
            assert_eq!(
                enumerate_port(&mut ctrl, port).unwrap_err(),
                UsbError::DeviceNotFound
            );
        }
    }

    #[test_case]
    fn corrupt_config_blob_aborts_enumeration() {
        let mut ctrl = UhciController::with_io(SimController::new_corrupt_config());
        crate::drivers::usb::host_controller::UsbHostController::init(&mut ctrl).unwrap();

        assert_eq!(
            enumerate_port(&mut ctrl, 0).unwrap_err(),
            UsbError::InvalidDescriptor
        );
        assert_eq!(pipe::open_count(), 0);
    }
}
