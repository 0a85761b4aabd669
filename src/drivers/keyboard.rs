//! USB 부트 키보드 드라이버
//!
//! 이 모듈은 USB HID 부트 프로토콜 키보드의 8바이트 입력 보고서를 해석하여
//! 키 이벤트 큐로 변환합니다. 보고서는 UHCI 인터럽트 파이프가 전달합니다.
//!
//! 부트 보고서 형식: [modifiers, reserved, key0, key1, key2, key3, key4, key5]

use spin::Mutex;

/// 동시에 등록할 수 있는 부트 키보드 수
pub const MAX_BOOT_KEYBOARDS: usize = 4;

/// 보고서의 동시 키 슬롯 수
const REPORT_KEY_SLOTS: usize = 6;

/// Modifier 비트 (왼쪽/오른쪽 Shift)
const MOD_LEFT_SHIFT: u8 = 1 << 1;
const MOD_RIGHT_SHIFT: u8 = 1 << 5;

/// 키 이벤트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// 디바이스 주소 (이벤트를 발생시킨 키보드)
    pub device_address: u8,
    /// HID usage 코드
    pub usage: u8,
    /// 변환된 ASCII 문자 (매핑이 없으면 None)
    pub ascii: Option<char>,
    /// true = 눌림, false = 떼어짐
    pub pressed: bool,
}

/// 등록된 부트 키보드 상태
#[derive(Clone, Copy)]
struct BootKeyboard {
    device_address: u8,
    /// 마지막 보고서 (눌림/떼어짐 비교 기준)
    last_report: [u8; 8],
}

static KEYBOARDS: Mutex<[Option<BootKeyboard>; MAX_BOOT_KEYBOARDS]> =
    Mutex::new([None; MAX_BOOT_KEYBOARDS]);

/// 키 이벤트 버퍼 (큐)
const BUFFER_SIZE: usize = 256;

struct EventBuffer {
    buffer: [Option<KeyEvent>; BUFFER_SIZE],
    read_index: usize,
    write_index: usize,
    count: usize,
}

impl EventBuffer {
    fn push(&mut self, event: KeyEvent) -> bool {
        if self.count >= BUFFER_SIZE {
            return false; // 버퍼 풀
        }
        self.buffer[self.write_index] = Some(event);
        self.write_index = (self.write_index + 1) % BUFFER_SIZE;
        self.count += 1;
        true
    }

    fn pop(&mut self) -> Option<KeyEvent> {
        if self.count == 0 {
            return None;
        }
        let event = self.buffer[self.read_index].take();
        self.read_index = (self.read_index + 1) % BUFFER_SIZE;
        self.count -= 1;
        event
    }
}

static EVENT_BUFFER: Mutex<EventBuffer> = Mutex::new(EventBuffer {
    buffer: [None; BUFFER_SIZE],
    read_index: 0,
    write_index: 0,
    count: 0,
});

/// 키보드 테이블 잠금
///
/// `on_boot_report`는 UHCI ISR에서 호출되므로, 비인터럽트 컨텍스트에서는
/// 인터럽트를 막은 채 잠가야 ISR과의 데드락이 없습니다.
#[cfg(not(test))]
fn with_keyboards<R>(f: impl FnOnce(&mut [Option<BootKeyboard>; MAX_BOOT_KEYBOARDS]) -> R) -> R {
    x86_64::instructions::interrupts::without_interrupts(|| f(&mut KEYBOARDS.lock()))
}

#[cfg(test)]
fn with_keyboards<R>(f: impl FnOnce(&mut [Option<BootKeyboard>; MAX_BOOT_KEYBOARDS]) -> R) -> R {
    f(&mut KEYBOARDS.lock())
}

/// 이벤트 큐 잠금 (키보드 테이블과 같은 규칙)
#[cfg(not(test))]
fn with_events<R>(f: impl FnOnce(&mut EventBuffer) -> R) -> R {
    x86_64::instructions::interrupts::without_interrupts(|| f(&mut EVENT_BUFFER.lock()))
}

#[cfg(test)]
fn with_events<R>(f: impl FnOnce(&mut EventBuffer) -> R) -> R {
    f(&mut EVENT_BUFFER.lock())
}

/// 부트 키보드 등록
///
/// 열거 과정에서 HID 부트 키보드가 발견되면 호출됩니다.
/// 등록 테이블이 가득 차면 None을 반환합니다.
pub fn register_boot_keyboard(device_address: u8) -> Option<usize> {
    let slot = with_keyboards(|keyboards| {
        let slot = keyboards.iter().position(|e| e.is_none())?;
        keyboards[slot] = Some(BootKeyboard {
            device_address,
            last_report: [0; 8],
        });
        Some(slot)
    });
    match slot {
        Some(slot) => {
            crate::log_info!(
                "Boot keyboard registered: device {} (slot {})",
                device_address,
                slot
            );
        }
        None => {
            crate::log_warn!(
                "Boot keyboard table full, cannot register device {}",
                device_address
            );
        }
    }
    slot
}

/// 부트 키보드 등록 해제
pub fn unregister_boot_keyboard(device_address: u8) {
    with_keyboards(|keyboards| {
        for entry in keyboards.iter_mut() {
            if let Some(kbd) = entry {
                if kbd.device_address == device_address {
                    *entry = None;
                    return;
                }
            }
        }
    });
}

/// 보고서에 특정 usage가 포함되어 있는지 확인
fn report_contains(report: &[u8; 8], usage: u8) -> bool {
    report[2..2 + REPORT_KEY_SLOTS].contains(&usage)
}

/// 새 부트 보고서 처리
///
/// 인터럽트 파이프가 성공적인 폴링마다 호출합니다. 이전 보고서와 비교하여
/// 새로 눌린 키와 떼어진 키를 이벤트 큐에 넣습니다.
pub fn on_boot_report(device_address: u8, report: &[u8; 8]) {
    let last = match with_keyboards(|keyboards| {
        keyboards
            .iter_mut()
            .flatten()
            .find(|k| k.device_address == device_address)
            .map(|kbd| core::mem::replace(&mut kbd.last_report, *report))
    }) {
        Some(last) => last,
        None => {
            crate::log_warn!("Report from unregistered keyboard (device {})", device_address);
            return;
        }
    };

    let modifiers = report[0];
    let shift = modifiers & (MOD_LEFT_SHIFT | MOD_RIGHT_SHIFT) != 0;

    with_events(|events| {
        // 새로 눌린 키
        for &usage in &report[2..2 + REPORT_KEY_SLOTS] {
            // usage 0 = 빈 슬롯, 1-3 = 에러 롤오버
            if usage > 0x03 && !report_contains(&last, usage) {
                let event = KeyEvent {
                    device_address,
                    usage,
                    ascii: hid_usage_to_ascii(usage, shift),
                    pressed: true,
                };
                if !events.push(event) {
                    crate::log_warn!("Key event buffer full, dropping usage 0x{:02X}", usage);
                }
            }
        }

        // 떼어진 키
        for &usage in &last[2..2 + REPORT_KEY_SLOTS] {
            if usage > 0x03 && !report_contains(report, usage) {
                let event = KeyEvent {
                    device_address,
                    usage,
                    ascii: hid_usage_to_ascii(usage, shift),
                    pressed: false,
                };
                events.push(event);
            }
        }
    });
}

/// 키 이벤트 읽기 (논블로킹)
///
/// 큐가 비어있으면 None을 반환합니다.
pub fn pop_event() -> Option<KeyEvent> {
    with_events(EventBuffer::pop)
}

/// HID usage 코드를 ASCII 문자로 변환
///
/// 부트 키보드가 실제로 보내는 기본 키만 처리합니다.
pub fn hid_usage_to_ascii(usage: u8, shift: bool) -> Option<char> {
    match usage {
        // 0x04-0x1D: a-z
        0x04..=0x1D => {
            let base = if shift { b'A' } else { b'a' };
            Some((base + (usage - 0x04)) as char)
        }
        // 0x1E-0x26: 1-9
        0x1E..=0x26 => Some((b'1' + (usage - 0x1E)) as char),
        // 0x27: 0
        0x27 => Some('0'),
        0x28 => Some('\n'),   // Enter
        0x2A => Some('\x08'), // Backspace
        0x2B => Some('\t'),   // Tab
        0x2C => Some(' '),    // Space
        0x2D => Some(if shift { '_' } else { '-' }),
        0x2E => Some(if shift { '+' } else { '=' }),
        0x36 => Some(if shift { '<' } else { ',' }),
        0x37 => Some(if shift { '>' } else { '.' }),
        0x38 => Some(if shift { '?' } else { '/' }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_events() {
        while pop_event().is_some() {}
    }

    #[test_case]
    fn usage_mapping_basics() {
        assert_eq!(hid_usage_to_ascii(0x04, false), Some('a'));
        assert_eq!(hid_usage_to_ascii(0x04, true), Some('A'));
        assert_eq!(hid_usage_to_ascii(0x1E, false), Some('1'));
        assert_eq!(hid_usage_to_ascii(0x27, false), Some('0'));
        assert_eq!(hid_usage_to_ascii(0x28, false), Some('\n'));
        assert_eq!(hid_usage_to_ascii(0x2C, false), Some(' '));
        assert_eq!(hid_usage_to_ascii(0xE0, false), None);
    }

    #[test_case]
    fn press_and_release_detection() {
        drain_events();
        let slot = register_boot_keyboard(42);
        assert!(slot.is_some());

        // 'a' 눌림
        on_boot_report(42, &[0, 0, 0x04, 0, 0, 0, 0, 0]);
        let ev = pop_event().unwrap();
        assert_eq!(ev.usage, 0x04);
        assert_eq!(ev.ascii, Some('a'));
        assert!(ev.pressed);

        // 같은 보고서 반복: 새 이벤트 없음
        on_boot_report(42, &[0, 0, 0x04, 0, 0, 0, 0, 0]);
        assert!(pop_event().is_none());

        // 키 떼어짐
        on_boot_report(42, &[0, 0, 0, 0, 0, 0, 0, 0]);
        let ev = pop_event().unwrap();
        assert_eq!(ev.usage, 0x04);
        assert!(!ev.pressed);

        unregister_boot_keyboard(42);
    }

    #[test_case]
    fn shift_modifier_applies() {
        drain_events();
        register_boot_keyboard(7);

        // 왼쪽 Shift + 'b'
        on_boot_report(7, &[0x02, 0, 0x05, 0, 0, 0, 0, 0]);
        let ev = pop_event().unwrap();
        assert_eq!(ev.ascii, Some('B'));

        unregister_boot_keyboard(7);
    }

    #[test_case]
    fn registry_capacity_is_bounded() {
        drain_events();
        let mut registered = [None; MAX_BOOT_KEYBOARDS];
        for (i, r) in registered.iter_mut().enumerate() {
            *r = register_boot_keyboard(100 + i as u8);
            assert!(r.is_some());
        }
        // 테이블이 가득 차면 등록 실패
        assert!(register_boot_keyboard(200).is_none());

        for i in 0..MAX_BOOT_KEYBOARDS {
            unregister_boot_keyboard(100 + i as u8);
        }
    }
}
