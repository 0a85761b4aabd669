//! USB 에러 타입

/// USB 관련 에러
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbError {
    /// 디바이스를 찾을 수 없음
    DeviceNotFound,
    /// 초기화되지 않음 (컨트롤러가 실행 중이 아님)
    NotInitialized,
    /// DMA 풀 고갈
    AllocationFailed,
    /// 전송 타임아웃 (마지막 TD가 Active 상태로 남음)
    TransferTimeout,
    /// 엔드포인트 STALL
    TransferStalled,
    /// 데이터 버퍼 에러 (오버런/언더런)
    DataBufferError,
    /// Babble 감지
    Babble,
    /// 비트 스터핑 에러
    BitStuffError,
    /// CRC 에러 또는 디바이스 무응답
    CrcTimeout,
    /// 디바이스가 NAK만 응답
    Nak,
    /// 호스트 컨트롤러 초기화 실패
    ControllerInitFailed,
    /// 디바이스 열거 실패
    EnumerationFailed,
    /// 잘못된 디스크립터
    InvalidDescriptor,
    /// 인터럽트 파이프 테이블이 가득 참
    PipeTableFull,
}

impl core::fmt::Display for UsbError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UsbError::DeviceNotFound => write!(f, "USB device not found"),
            UsbError::NotInitialized => write!(f, "USB host controller not running"),
            UsbError::AllocationFailed => write!(f, "USB DMA pool exhausted"),
            UsbError::TransferTimeout => write!(f, "USB transfer timeout"),
            UsbError::TransferStalled => write!(f, "USB endpoint stalled"),
            UsbError::DataBufferError => write!(f, "USB data buffer error"),
            UsbError::Babble => write!(f, "USB babble detected"),
            UsbError::BitStuffError => write!(f, "USB bit stuff error"),
            UsbError::CrcTimeout => write!(f, "USB CRC error or device timeout"),
            UsbError::Nak => write!(f, "USB device not responding (NAK)"),
            UsbError::ControllerInitFailed => write!(f, "USB host controller initialization failed"),
            UsbError::EnumerationFailed => write!(f, "USB device enumeration failed"),
            UsbError::InvalidDescriptor => write!(f, "Invalid USB descriptor"),
            UsbError::PipeTableFull => write!(f, "USB interrupt pipe table full"),
        }
    }
}
