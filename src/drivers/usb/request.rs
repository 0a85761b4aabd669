//! USB 표준 요청 처리
//!
//! 이 모듈은 제어 전송의 SETUP 단계에서 전송되는 8바이트 요청 패킷을 구성합니다.

use crate::drivers::usb::descriptor::DescriptorType;

/// USB 요청 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbRequestDirection {
    /// 호스트 → 디바이스
    HostToDevice = 0x00,
    /// 디바이스 → 호스트
    DeviceToHost = 0x80,
}

/// USB 표준 요청 코드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbStandardRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
}

/// USB 제어 요청 구조 (SETUP 패킷, 정확히 8바이트)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct UsbControlRequest {
    /// 요청 타입 (bmRequestType)
    pub request_type: u8,
    /// 요청 코드 (bRequest)
    pub request: u8,
    /// 값 (wValue)
    pub value: u16,
    /// 인덱스 (wIndex)
    pub index: u16,
    /// 길이 (wLength)
    pub length: u16,
}

impl UsbControlRequest {
    /// 표준 Get Descriptor 요청 생성
    pub fn new_get_descriptor(
        descriptor_type: DescriptorType,
        descriptor_index: u8,
        language_id: u16,
        length: u16,
    ) -> Self {
        Self {
            request_type: 0x80, // Device to Host, Standard, Device
            request: UsbStandardRequest::GetDescriptor as u8,
            value: ((descriptor_type as u16) << 8) | (descriptor_index as u16),
            index: language_id,
            length,
        }
    }

    /// Set Address 요청 생성
    pub fn new_set_address(address: u8) -> Self {
        Self {
            request_type: 0x00, // Host to Device, Standard, Device
            request: UsbStandardRequest::SetAddress as u8,
            value: address as u16,
            index: 0,
            length: 0,
        }
    }

    /// Set Configuration 요청 생성
    pub fn new_set_configuration(configuration_value: u8) -> Self {
        Self {
            request_type: 0x00, // Host to Device, Standard, Device
            request: UsbStandardRequest::SetConfiguration as u8,
            value: configuration_value as u16,
            index: 0,
            length: 0,
        }
    }

    /// 요청이 디바이스 → 호스트 방향인지 확인
    pub fn is_device_to_host(&self) -> bool {
        self.request_type & 0x80 != 0
    }

    /// 8바이트 배열로 직렬화 (SETUP 버퍼에 복사할 때 사용)
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0] = self.request_type;
        bytes[1] = self.request;
        bytes[2..4].copy_from_slice(&self.value.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.index.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn get_descriptor_layout() {
        let req = UsbControlRequest::new_get_descriptor(DescriptorType::Device, 0, 0, 18);
        let bytes = req.to_bytes();
        assert_eq!(bytes, [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 18, 0]);
        assert!(req.is_device_to_host());
    }

    #[test_case]
    fn set_address_layout() {
        let req = UsbControlRequest::new_set_address(3);
        let bytes = req.to_bytes();
        assert_eq!(bytes, [0x00, 0x05, 3, 0, 0, 0, 0, 0]);
        assert!(!req.is_device_to_host());
    }
}
