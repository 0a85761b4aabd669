//! USB 디바이스 관리
//!
//! 이 모듈은 USB 디바이스의 상태 및 정보를 관리합니다.

use crate::drivers::usb::descriptor::{
    ConfigurationDescriptor, DeviceDescriptor, EndpointDescriptor, InterfaceDescriptor,
};
use crate::drivers::usb::UsbClassCode;

/// 열거 진행 단계
///
/// 열거가 중간에 실패하면 디바이스는 마지막으로 도달한 단계를 유지합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnumerationStage {
    /// 포트 리셋 완료, 기본 주소(0) 상태
    PortReset,
    /// SET_ADDRESS 완료
    AddressAssigned,
    /// 디바이스 디스크립터 수신
    DeviceDescribed,
    /// 구성 디스크립터 blob 수신
    ConfigDiscovered,
    /// 구성 blob 파싱 완료
    ConfigParsed,
    /// SET_CONFIGURATION 완료
    Configured,
    /// 인터럽트 파이프 개설 완료 (부트 키보드)
    PipeOpened,
}

/// USB 디바이스
#[derive(Debug, Clone, Copy)]
pub struct UsbDevice {
    /// 디바이스 주소 (1-127)
    address: u8,
    /// 연결된 루트 포트 (0부터 시작)
    port: u8,
    /// 디바이스 디스크립터
    device_descriptor: Option<DeviceDescriptor>,
    /// 구성 디스크립터 (blob 선두)
    configuration_descriptor: Option<ConfigurationDescriptor>,
    /// 선택된 인터페이스
    interface_descriptor: Option<InterfaceDescriptor>,
    /// 선택된 인터럽트 IN 엔드포인트
    endpoint_descriptor: Option<EndpointDescriptor>,
    /// 열거 진행 단계
    stage: EnumerationStage,
    /// 디바이스 클래스
    class_code: UsbClassCode,
    /// 최대 패킷 크기 (Endpoint 0)
    max_packet_size: u8,
}

impl UsbDevice {
    /// 새 USB 디바이스 생성
    pub fn new(address: u8, port: u8) -> Self {
        Self {
            address,
            port,
            device_descriptor: None,
            configuration_descriptor: None,
            interface_descriptor: None,
            endpoint_descriptor: None,
            stage: EnumerationStage::PortReset,
            class_code: UsbClassCode::Unknown,
            max_packet_size: 8, // 기본값
        }
    }

    /// 디바이스 주소 가져오기
    pub fn address(&self) -> u8 {
        self.address
    }

    /// 루트 포트 번호 가져오기
    pub fn port(&self) -> u8 {
        self.port
    }

    /// 열거 단계 가져오기
    pub fn stage(&self) -> EnumerationStage {
        self.stage
    }

    /// 열거 단계 설정
    pub fn set_stage(&mut self, stage: EnumerationStage) {
        self.stage = stage;
    }

    /// 디바이스 클래스 가져오기
    ///
    /// 디바이스 디스크립터의 클래스가 0이면 인터페이스 클래스를 사용합니다.
    pub fn class_code(&self) -> UsbClassCode {
        self.class_code
    }

    /// 디바이스 디스크립터 설정
    pub fn set_device_descriptor(&mut self, descriptor: DeviceDescriptor) {
        self.max_packet_size = descriptor.max_packet_size;
        if descriptor.device_class != 0 {
            self.class_code = UsbClassCode::from(descriptor.device_class);
        }
        self.device_descriptor = Some(descriptor);
    }

    /// 디바이스 디스크립터 가져오기
    pub fn device_descriptor(&self) -> Option<&DeviceDescriptor> {
        self.device_descriptor.as_ref()
    }

    /// 구성 디스크립터 설정
    pub fn set_configuration_descriptor(&mut self, descriptor: ConfigurationDescriptor) {
        self.configuration_descriptor = Some(descriptor);
    }

    /// 구성 디스크립터 가져오기
    pub fn configuration_descriptor(&self) -> Option<&ConfigurationDescriptor> {
        self.configuration_descriptor.as_ref()
    }

    /// 선택된 인터페이스 설정
    ///
    /// 디바이스 클래스가 0(인터페이스에서 정의)이면 여기서 클래스를 확정합니다.
    pub fn set_interface_descriptor(&mut self, descriptor: InterfaceDescriptor) {
        if self.class_code == UsbClassCode::Unknown {
            self.class_code = UsbClassCode::from(descriptor.interface_class);
        }
        self.interface_descriptor = Some(descriptor);
    }

    /// 선택된 인터페이스 가져오기
    pub fn interface_descriptor(&self) -> Option<&InterfaceDescriptor> {
        self.interface_descriptor.as_ref()
    }

    /// 선택된 인터럽트 IN 엔드포인트 설정
    pub fn set_endpoint_descriptor(&mut self, descriptor: EndpointDescriptor) {
        self.endpoint_descriptor = Some(descriptor);
    }

    /// 선택된 인터럽트 IN 엔드포인트 가져오기
    pub fn endpoint_descriptor(&self) -> Option<&EndpointDescriptor> {
        self.endpoint_descriptor.as_ref()
    }

    /// 최대 패킷 크기 가져오기
    pub fn max_packet_size(&self) -> u8 {
        self.max_packet_size
    }
}
