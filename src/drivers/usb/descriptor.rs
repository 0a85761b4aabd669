//! USB 디스크립터 구조
//!
//! USB 디바이스는 다양한 디스크립터를 통해 자신의 정보를 제공합니다.
//! 이 모듈은 USB 디스크립터 구조체와 구성 디스크립터 blob의 TLV 파서를
//! 제공합니다.

use crate::drivers::usb::error::UsbError;

/// USB 디스크립터 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorType {
    Device = 0x01,
    Configuration = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
    DeviceQualifier = 0x06,
    OtherSpeedConfiguration = 0x07,
    InterfacePower = 0x08,
}

/// HID 부트 키보드 인터페이스 식별 (class 3, subclass 1, protocol 1)
pub const CLASS_HID: u8 = 0x03;
pub const SUBCLASS_BOOT: u8 = 0x01;
pub const PROTOCOL_KEYBOARD: u8 = 0x01;

/// USB 디바이스 디스크립터
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct DeviceDescriptor {
    /// 디스크립터 길이 (18바이트)
    pub length: u8,
    /// 디스크립터 타입 (Device = 0x01)
    pub descriptor_type: u8,
    /// USB 버전 (BCD 형식, 예: 0x0110 = USB 1.1)
    pub usb_version: u16,
    /// 디바이스 클래스
    pub device_class: u8,
    /// 디바이스 서브클래스
    pub device_subclass: u8,
    /// 디바이스 프로토콜
    pub device_protocol: u8,
    /// 최대 패킷 크기 (Endpoint 0)
    pub max_packet_size: u8,
    /// 벤더 ID
    pub vendor_id: u16,
    /// 프로덕트 ID
    pub product_id: u16,
    /// 디바이스 버전 (BCD)
    pub device_version: u16,
    /// 제조사 문자열 인덱스
    pub manufacturer_string: u8,
    /// 제품 문자열 인덱스
    pub product_string: u8,
    /// 시리얼 번호 문자열 인덱스
    pub serial_string: u8,
    /// 구성 디스크립터 수
    pub num_configurations: u8,
}

/// USB 구성 디스크립터
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationDescriptor {
    /// 디스크립터 길이 (9바이트)
    pub length: u8,
    /// 디스크립터 타입 (Configuration = 0x02)
    pub descriptor_type: u8,
    /// 전체 구성 길이 (인터페이스/엔드포인트 포함)
    pub total_length: u16,
    /// 인터페이스 수
    pub num_interfaces: u8,
    /// 구성 값 (SET_CONFIGURATION에 전달)
    pub configuration_value: u8,
    /// 구성 문자열 인덱스
    pub configuration_string: u8,
    /// 속성 (Self-powered, Remote wakeup 등)
    pub attributes: u8,
    /// 최대 전력 (2mA 단위)
    pub max_power: u8,
}

/// USB 인터페이스 디스크립터
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    /// 디스크립터 길이 (9바이트)
    pub length: u8,
    /// 디스크립터 타입 (Interface = 0x04)
    pub descriptor_type: u8,
    /// 인터페이스 번호
    pub interface_number: u8,
    /// 대체 설정
    pub alternate_setting: u8,
    /// 엔드포인트 수
    pub num_endpoints: u8,
    /// 인터페이스 클래스
    pub interface_class: u8,
    /// 인터페이스 서브클래스
    pub interface_subclass: u8,
    /// 인터페이스 프로토콜
    pub interface_protocol: u8,
    /// 인터페이스 문자열 인덱스
    pub interface_string: u8,
}

impl InterfaceDescriptor {
    /// HID 부트 키보드 인터페이스인지 확인
    pub fn is_boot_keyboard(&self) -> bool {
        self.interface_class == CLASS_HID
            && self.interface_subclass == SUBCLASS_BOOT
            && self.interface_protocol == PROTOCOL_KEYBOARD
    }
}

/// USB 엔드포인트 디스크립터
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// 디스크립터 길이 (7바이트)
    pub length: u8,
    /// 디스크립터 타입 (Endpoint = 0x05)
    pub descriptor_type: u8,
    /// 엔드포인트 주소 (비트 7: 방향, 비트 3-0: 엔드포인트 번호)
    pub endpoint_address: u8,
    /// 속성 (비트 1-0: 전송 타입)
    pub attributes: u8,
    /// 최대 패킷 크기
    pub max_packet_size: u16,
    /// 폴링 간격 (프레임 단위)
    pub interval: u8,
}

impl EndpointDescriptor {
    /// 엔드포인트 번호 추출
    pub fn endpoint_number(&self) -> u8 {
        self.endpoint_address & 0x0F
    }

    /// 엔드포인트 방향 (true = IN, false = OUT)
    pub fn is_in(&self) -> bool {
        (self.endpoint_address & 0x80) != 0
    }

    /// 전송 타입 추출
    pub fn transfer_type(&self) -> EndpointTransferType {
        match self.attributes & 0x03 {
            0 => EndpointTransferType::Control,
            1 => EndpointTransferType::Isochronous,
            2 => EndpointTransferType::Bulk,
            _ => EndpointTransferType::Interrupt,
        }
    }

    /// 인터럽트 IN 엔드포인트인지 확인
    pub fn is_interrupt_in(&self) -> bool {
        self.is_in() && self.transfer_type() == EndpointTransferType::Interrupt
    }
}

/// 엔드포인트 전송 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointTransferType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

/// 구성 blob 파싱 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedConfiguration {
    /// 구성 디스크립터 (blob 선두 9바이트)
    pub configuration: ConfigurationDescriptor,
    /// 선택된 인터페이스
    pub interface: InterfaceDescriptor,
    /// 선택된 인터페이스 블록의 첫 번째 인터럽트 IN 엔드포인트
    pub endpoint: Option<EndpointDescriptor>,
    /// 선택된 인터페이스가 HID 부트 키보드인지 여부
    pub is_boot_keyboard: bool,
}

/// blob의 지정 위치에서 디스크립터 구조체를 읽습니다.
///
/// 호출자는 `offset + size_of::<T>() <= blob.len()`을 보장해야 합니다.
fn read_descriptor<T: Copy>(blob: &[u8], offset: usize) -> T {
    debug_assert!(offset + core::mem::size_of::<T>() <= blob.len());
    unsafe { core::ptr::read_unaligned(blob.as_ptr().add(offset) as *const T) }
}

/// 구성 디스크립터 blob 파싱
///
/// 디바이스가 반환한 전체 구성 blob을 두 번 순회합니다:
/// 1. HID 부트 키보드 인터페이스(3/1/1)를 우선 탐색
/// 2. 없으면 첫 번째 인터페이스로 폴백
///
/// 선택된 인터페이스 블록(다음 인터페이스 디스크립터 전까지)에서 첫 번째
/// 인터럽트 IN 엔드포인트를 찾습니다. 길이 0 디스크립터나 blob 경계를 넘는
/// 디스크립터를 만나면 그 지점에서 순회를 멈춥니다.
pub fn parse_configuration(blob: &[u8]) -> Result<ParsedConfiguration, UsbError> {
    const CONFIG_LEN: usize = core::mem::size_of::<ConfigurationDescriptor>();
    const INTERFACE_LEN: usize = core::mem::size_of::<InterfaceDescriptor>();
    const ENDPOINT_LEN: usize = core::mem::size_of::<EndpointDescriptor>();

    if blob.len() < CONFIG_LEN {
        return Err(UsbError::InvalidDescriptor);
    }

    let configuration: ConfigurationDescriptor = read_descriptor(blob, 0);
    if configuration.descriptor_type != DescriptorType::Configuration as u8
        || (configuration.length as usize) < CONFIG_LEN
    {
        return Err(UsbError::InvalidDescriptor);
    }

    // 인터페이스 디스크립터 오프셋 탐색
    let find_interface = |want_boot_keyboard: bool| -> Option<usize> {
        let mut offset = configuration.length as usize;
        while offset + 2 <= blob.len() {
            let len = blob[offset] as usize;
            let desc_type = blob[offset + 1];
            if len == 0 || offset + len > blob.len() {
                // 손상된 blob: 여기서 순회 종료
                return None;
            }
            if desc_type == DescriptorType::Interface as u8 && len >= INTERFACE_LEN {
                let intf: InterfaceDescriptor = read_descriptor(blob, offset);
                if !want_boot_keyboard || intf.is_boot_keyboard() {
                    return Some(offset);
                }
            }
            offset += len;
        }
        None
    };

    // 1차: 부트 키보드, 2차: 첫 인터페이스
    let (intf_offset, is_boot_keyboard) = match find_interface(true) {
        Some(off) => (off, true),
        None => match find_interface(false) {
            Some(off) => (off, false),
            None => return Err(UsbError::InvalidDescriptor),
        },
    };
    let interface: InterfaceDescriptor = read_descriptor(blob, intf_offset);

    // 선택된 인터페이스 블록에서 첫 인터럽트 IN 엔드포인트 탐색
    let mut endpoint: Option<EndpointDescriptor> = None;
    let mut offset = intf_offset + blob[intf_offset] as usize;
    while offset + 2 <= blob.len() {
        let len = blob[offset] as usize;
        let desc_type = blob[offset + 1];
        if len == 0 || offset + len > blob.len() {
            break;
        }
        if desc_type == DescriptorType::Interface as u8 {
            // 다음 인터페이스 블록 시작: 탐색 종료
            break;
        }
        if desc_type == DescriptorType::Endpoint as u8 && len >= ENDPOINT_LEN {
            let ep: EndpointDescriptor = read_descriptor(blob, offset);
            if ep.is_interrupt_in() {
                endpoint = Some(ep);
                break;
            }
        }
        offset += len;
    }

    Ok(ParsedConfiguration {
        configuration,
        interface,
        endpoint,
        is_boot_keyboard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn config_header(total_length: u16, num_interfaces: u8) -> [u8; 9] {
        let tl = total_length.to_le_bytes();
        [9, 0x02, tl[0], tl[1], num_interfaces, 1, 0, 0xA0, 50]
    }

    fn interface(number: u8, class: u8, subclass: u8, protocol: u8, num_eps: u8) -> [u8; 9] {
        [9, 0x04, number, 0, num_eps, class, subclass, protocol, 0]
    }

    fn endpoint(address: u8, attributes: u8, interval: u8) -> [u8; 7] {
        [7, 0x05, address, attributes, 8, 0, interval]
    }

    fn build_blob(parts: &[&[u8]]) -> Vec<u8> {
        let mut blob = Vec::new();
        for p in parts {
            blob.extend_from_slice(p);
        }
        let total = blob.len() as u16;
        blob[2..4].copy_from_slice(&total.to_le_bytes());
        blob
    }

    #[test_case]
    fn boot_keyboard_preferred_over_earlier_interface() {
        // 대용량 저장장치 인터페이스가 먼저 나와도 부트 키보드를 선택
        let blob = build_blob(&[
            &config_header(0, 2),
            &interface(0, 0x08, 0x06, 0x50, 2),
            &endpoint(0x81, 0x02, 0), // bulk IN
            &endpoint(0x02, 0x02, 0), // bulk OUT
            &interface(1, 0x03, 0x01, 0x01, 1),
            &endpoint(0x83, 0x03, 10), // interrupt IN
        ]);

        let parsed = parse_configuration(&blob).unwrap();
        assert!(parsed.is_boot_keyboard);
        assert_eq!(parsed.interface.interface_number, 1);
        let ep = parsed.endpoint.unwrap();
        assert_eq!(ep.endpoint_number(), 3);
        assert_eq!(ep.interval, 10);
    }

    #[test_case]
    fn falls_back_to_first_interface() {
        // 부트 키보드가 없으면 첫 인터페이스 (인터럽트 IN 엔드포인트 없음)
        let blob = build_blob(&[
            &config_header(0, 1),
            &interface(0, 0x08, 0x06, 0x50, 2),
            &endpoint(0x81, 0x02, 0),
            &endpoint(0x02, 0x02, 0),
        ]);

        let parsed = parse_configuration(&blob).unwrap();
        assert!(!parsed.is_boot_keyboard);
        assert_eq!(parsed.interface.interface_class, 0x08);
        assert!(parsed.endpoint.is_none());
    }

    #[test_case]
    fn endpoint_search_stays_in_interface_block() {
        // 첫 인터페이스에는 인터럽트 IN이 없고 다음 인터페이스에만 있는 경우,
        // 폴백 선택 시 다음 블록의 엔드포인트를 가져오면 안 됨
        let blob = build_blob(&[
            &config_header(0, 2),
            &interface(0, 0xFF, 0x00, 0x00, 0),
            &interface(1, 0xFF, 0x00, 0x00, 1),
            &endpoint(0x81, 0x03, 8),
        ]);

        let parsed = parse_configuration(&blob).unwrap();
        assert_eq!(parsed.interface.interface_number, 0);
        assert!(parsed.endpoint.is_none());
    }

    #[test_case]
    fn zero_length_descriptor_stops_traversal() {
        let mut blob = build_blob(&[
            &config_header(0, 1),
            &interface(0, 0x03, 0x01, 0x01, 1),
            &endpoint(0x81, 0x03, 10),
        ]);
        // 인터페이스 디스크립터 자리를 길이 0으로 손상
        blob[9] = 0;

        assert_eq!(parse_configuration(&blob), Err(UsbError::InvalidDescriptor));
    }

    #[test_case]
    fn truncated_blob_is_rejected() {
        assert_eq!(parse_configuration(&[9, 0x02, 0x20]), Err(UsbError::InvalidDescriptor));

        // 헤더만 있고 인터페이스가 없는 blob
        let blob = config_header(9, 1);
        assert_eq!(parse_configuration(&blob), Err(UsbError::InvalidDescriptor));
    }

    #[test_case]
    fn wrong_header_type_is_rejected() {
        let mut blob = build_blob(&[
            &config_header(0, 1),
            &interface(0, 0x03, 0x01, 0x01, 0),
        ]);
        blob[1] = 0x04; // Configuration이 아님

        assert_eq!(parse_configuration(&blob), Err(UsbError::InvalidDescriptor));
    }
}
