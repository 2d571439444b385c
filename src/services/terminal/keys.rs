//! Keyboard input to terminal byte sequences.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Encode a key press the way an xterm-compatible terminal would.
///
/// Returns `None` for releases and keys with no byte representation.
pub fn key_event_bytes(event: &KeyEvent) -> Option<Vec<u8>> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    key_bytes(event.code, event.modifiers)
}

pub fn key_bytes(code: KeyCode, modifiers: KeyModifiers) -> Option<Vec<u8>> {
    let ctrl = modifiers.contains(KeyModifiers::CONTROL);
    let alt = modifiers.contains(KeyModifiers::ALT);
    let shift = modifiers.contains(KeyModifiers::SHIFT);

    if let KeyCode::Char(c) = code {
        if ctrl {
            let mut bytes = control_char(c)?;
            if alt {
                bytes.insert(0, 0x1b);
            }
            return Some(bytes);
        }
        let mut buf = [0u8; 4];
        let mut bytes = c.encode_utf8(&mut buf).as_bytes().to_vec();
        if alt {
            bytes.insert(0, 0x1b);
        }
        return Some(bytes);
    }

    // xterm modifier parameter: 1 + shift + 2*alt + 4*ctrl
    let param = 1 + u8::from(shift) + 2 * u8::from(alt) + 4 * u8::from(ctrl);
    let cursor = |final_byte: u8| -> Vec<u8> {
        if param == 1 {
            vec![0x1b, b'[', final_byte]
        } else {
            format!("\x1b[1;{}{}", param, final_byte as char).into_bytes()
        }
    };
    let tilde = |number: u8| -> Vec<u8> {
        if param == 1 {
            format!("\x1b[{}~", number).into_bytes()
        } else {
            format!("\x1b[{};{}~", number, param).into_bytes()
        }
    };

    let bytes = match code {
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Backspace if ctrl => vec![0x17],
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => cursor(b'A'),
        KeyCode::Down => cursor(b'B'),
        KeyCode::Right => cursor(b'C'),
        KeyCode::Left => cursor(b'D'),
        KeyCode::Home => cursor(b'H'),
        KeyCode::End => cursor(b'F'),
        KeyCode::Insert => tilde(2),
        KeyCode::Delete => tilde(3),
        KeyCode::PageUp => tilde(5),
        KeyCode::PageDown => tilde(6),
        KeyCode::F(n @ 1..=4) if param == 1 => vec![0x1b, b'O', b'P' + (n - 1)],
        KeyCode::F(n @ 1..=4) => format!("\x1b[1;{}{}", param, (b'P' + (n - 1)) as char).into_bytes(),
        KeyCode::F(n) => tilde(function_key_number(n)?),
        _ => return None,
    };
    Some(bytes)
}

fn control_char(c: char) -> Option<Vec<u8>> {
    let c = c.to_ascii_lowercase();
    let byte = match c {
        'a'..='z' => c as u8 - b'a' + 1,
        '@' | ' ' | '2' => 0x00,
        '[' | '3' => 0x1b,
        '\\' | '4' => 0x1c,
        ']' | '5' => 0x1d,
        '^' | '6' => 0x1e,
        '_' | '7' => 0x1f,
        '?' | '8' => 0x7f,
        _ => return None,
    };
    Some(vec![byte])
}

fn function_key_number(n: u8) -> Option<u8> {
    Some(match n {
        5 => 15,
        6 => 17,
        7 => 18,
        8 => 19,
        9 => 20,
        10 => 21,
        11 => 23,
        12 => 24,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_control_chars() {
        assert_eq!(key_bytes(KeyCode::Char('a'), KeyModifiers::NONE), Some(b"a".to_vec()));
        assert_eq!(key_bytes(KeyCode::Char('é'), KeyModifiers::NONE), Some("é".as_bytes().to_vec()));
        assert_eq!(key_bytes(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(vec![0x03]));
        assert_eq!(key_bytes(KeyCode::Char('x'), KeyModifiers::ALT), Some(b"\x1bx".to_vec()));
        assert_eq!(key_bytes(KeyCode::Enter, KeyModifiers::NONE), Some(b"\r".to_vec()));
    }

    #[test]
    fn test_cursor_keys_with_modifiers() {
        assert_eq!(key_bytes(KeyCode::Up, KeyModifiers::NONE), Some(b"\x1b[A".to_vec()));
        assert_eq!(key_bytes(KeyCode::Left, KeyModifiers::CONTROL), Some(b"\x1b[1;5D".to_vec()));
        assert_eq!(
            key_bytes(KeyCode::Right, KeyModifiers::SHIFT | KeyModifiers::ALT),
            Some(b"\x1b[1;4C".to_vec())
        );
        assert_eq!(key_bytes(KeyCode::Delete, KeyModifiers::NONE), Some(b"\x1b[3~".to_vec()));
        assert_eq!(key_bytes(KeyCode::Delete, KeyModifiers::CONTROL), Some(b"\x1b[3;5~".to_vec()));
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(key_bytes(KeyCode::F(1), KeyModifiers::NONE), Some(b"\x1bOP".to_vec()));
        assert_eq!(key_bytes(KeyCode::F(5), KeyModifiers::NONE), Some(b"\x1b[15~".to_vec()));
        assert_eq!(key_bytes(KeyCode::F(13), KeyModifiers::NONE), None);
    }

    #[test]
    fn test_release_ignored() {
        let mut event = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        event.kind = KeyEventKind::Release;
        assert_eq!(key_event_bytes(&event), None);
    }
}
