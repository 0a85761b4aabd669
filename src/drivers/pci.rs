//! PCI (Peripheral Component Interconnect) 버스 관리
//!
//! 이 모듈은 PCI 버스를 스캔하여 디바이스를 발견하고 관리합니다.

use x86_64::instructions::port::Port;

/// PCI 구성 공간 포트
const PCI_CONFIG_ADDRESS: u16 = 0xCF8;
const PCI_CONFIG_DATA: u16 = 0xCFC;

/// PCI 구성 공간 레지스터 오프셋
const PCI_VENDOR_ID: u8 = 0x00;
const PCI_COMMAND: u8 = 0x04;
const PCI_CLASS_CODE: u8 = 0x08;
const PCI_HEADER_TYPE: u8 = 0x0C;
const PCI_BAR0: u8 = 0x10;
const PCI_BAR4: u8 = 0x20;
const PCI_INTERRUPT_LINE: u8 = 0x3C;

/// PCI Command 레지스터 비트
const PCI_COMMAND_IO_SPACE: u32 = 1 << 0;
const PCI_COMMAND_BUS_MASTER: u32 = 1 << 2;

/// PCI 헤더 타입
const PCI_HEADER_TYPE_DEVICE: u8 = 0x00;

/// PCI 클래스 코드
pub const PCI_CLASS_SERIAL_BUS: u8 = 0x0C;

/// Serial Bus 서브클래스
pub const PCI_SUBCLASS_USB: u8 = 0x03;

/// PCI 디바이스 정보
#[derive(Debug, Clone, Copy)]
pub struct PciDevice {
    /// 버스 번호
    pub bus: u8,
    /// 디바이스 번호
    pub device: u8,
    /// 함수 번호
    pub function: u8,
    /// 벤더 ID
    pub vendor_id: u16,
    /// 디바이스 ID
    pub device_id: u16,
    /// 클래스 코드
    pub class_code: u8,
    /// 서브클래스
    pub subclass: u8,
    /// 프로그래밍 인터페이스
    pub prog_if: u8,
    /// 헤더 타입
    pub header_type: u8,
    /// BAR0 (베이스 주소 레지스터 0)
    pub bar0: u32,
    /// BAR4 (UHCI는 I/O BAR를 여기에 둡니다)
    pub bar4: u32,
    /// 인터럽트 라인 (PIC IRQ 번호)
    pub interrupt_line: u8,
}

impl PciDevice {
    const fn empty(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
            vendor_id: 0,
            device_id: 0,
            class_code: 0,
            subclass: 0,
            prog_if: 0,
            header_type: 0,
            bar0: 0,
            bar4: 0,
            interrupt_line: 0,
        }
    }

    /// PCI 구성 공간에서 32비트 레지스터 읽기
    ///
    /// # Safety
    /// 유효한 PCI 디바이스에 대한 접근이어야 합니다.
    pub unsafe fn read_config_register(&self, offset: u8) -> u32 {
        let address = self.make_config_address(offset);

        let mut address_port: Port<u32> = Port::new(PCI_CONFIG_ADDRESS);
        address_port.write(address);

        let mut data_port: Port<u32> = Port::new(PCI_CONFIG_DATA);
        data_port.read()
    }

    /// PCI 구성 공간에 32비트 레지스터 쓰기
    ///
    /// # Safety
    /// 유효한 PCI 디바이스에 대한 접근이어야 합니다.
    pub unsafe fn write_config_register(&self, offset: u8, value: u32) {
        let address = self.make_config_address(offset);

        let mut address_port: Port<u32> = Port::new(PCI_CONFIG_ADDRESS);
        address_port.write(address);

        let mut data_port: Port<u32> = Port::new(PCI_CONFIG_DATA);
        data_port.write(value);
    }

    /// PCI 구성 공간 주소 생성
    fn make_config_address(&self, offset: u8) -> u32 {
        let enable_bit = 1 << 31;
        let bus_bits = (self.bus as u32) << 16;
        let device_bits = (self.device as u32) << 11;
        let function_bits = (self.function as u32) << 8;
        let offset_bits = (offset as u32) & 0xFC; // 하위 2비트는 0 (32비트 정렬)

        enable_bit | bus_bits | device_bits | function_bits | offset_bits
    }

    /// 디바이스가 존재하는지 확인
    ///
    /// # Safety
    /// 유효한 PCI 버스/디바이스/함수 번호에 대한 접근이어야 합니다.
    pub unsafe fn exists(&self) -> bool {
        let vendor_id = self.read_config_register(PCI_VENDOR_ID) as u16;
        // 0xFFFF는 존재하지 않는 디바이스를 의미
        vendor_id != 0xFFFF
    }

    /// 디바이스 정보 읽기
    ///
    /// # Safety
    /// 유효한 PCI 디바이스에 대한 접근이어야 합니다.
    pub unsafe fn read_info(&mut self) {
        let vendor_device = self.read_config_register(PCI_VENDOR_ID);
        self.vendor_id = vendor_device as u16;
        self.device_id = (vendor_device >> 16) as u16;

        let class_revision = self.read_config_register(PCI_CLASS_CODE);
        self.class_code = ((class_revision >> 24) & 0xFF) as u8;
        self.subclass = ((class_revision >> 16) & 0xFF) as u8;
        self.prog_if = ((class_revision >> 8) & 0xFF) as u8;

        let header_type_status = self.read_config_register(PCI_HEADER_TYPE);
        self.header_type = ((header_type_status >> 16) & 0xFF) as u8;

        self.bar0 = self.read_config_register(PCI_BAR0);
        self.bar4 = self.read_config_register(PCI_BAR4);
        self.interrupt_line = (self.read_config_register(PCI_INTERRUPT_LINE) & 0xFF) as u8;
    }

    /// BAR4에서 I/O 포트 베이스 주소 추출
    ///
    /// UHCI 컨트롤러는 레지스터를 I/O 공간(BAR 하위 비트 1)에 노출합니다.
    /// 메모리 매핑 BAR이면 `None`을 반환합니다.
    pub fn io_base(&self) -> Option<u16> {
        if self.bar4 & 0x1 != 0 {
            Some((self.bar4 & 0xFFFC) as u16)
        } else {
            None
        }
    }

    /// I/O 공간 접근과 버스 마스터링 활성화
    ///
    /// UHCI는 버스 마스터로서 Frame List와 TD를 DMA로 읽으므로
    /// 컨트롤러를 시작하기 전에 반드시 호출되어야 합니다.
    ///
    /// # Safety
    /// 유효한 PCI 디바이스에 대한 접근이어야 합니다.
    pub unsafe fn enable_bus_mastering(&self) {
        let command = self.read_config_register(PCI_COMMAND);
        self.write_config_register(
            PCI_COMMAND,
            command | PCI_COMMAND_IO_SPACE | PCI_COMMAND_BUS_MASTER,
        );
    }
}

/// PCI 버스 스캔
///
/// 모든 PCI 버스를 스캔하여 디바이스를 찾고, 콜백 함수를 호출합니다.
/// 콜백이 true를 반환하면 스캔을 중단합니다.
///
/// # Safety
/// 메모리 관리가 초기화된 후에 호출되어야 합니다.
pub unsafe fn scan_pci_bus<F: FnMut(&PciDevice) -> bool>(mut callback: F) {
    // 각 버스 스캔 (일반적으로 0-255 버스, 하지만 대부분 0-1만 사용)
    for bus in 0..=255u8 {
        // 각 디바이스 스캔 (0-31 디바이스)
        for device in 0..=31u8 {
            let mut pci_device = PciDevice::empty(bus, device, 0);
            if !pci_device.exists() {
                continue;
            }
            pci_device.read_info();

            // 헤더 타입 확인 (다중 함수 비트 제거)
            let header_type = pci_device.header_type & 0x7F;
            if header_type != PCI_HEADER_TYPE_DEVICE {
                continue;
            }

            if (pci_device.header_type & 0x80) != 0 {
                // 다중 함수 디바이스
                for function in 0..8u8 {
                    let mut func_device = PciDevice::empty(bus, device, function);
                    if func_device.exists() {
                        func_device.read_info();
                        if callback(&func_device) {
                            return;
                        }
                    }
                }
            } else if callback(&pci_device) {
                return;
            }
        }
    }
}