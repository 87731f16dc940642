// Pitch and length spelling.
//
// MIDI pitch numbers are spelled two ways: as ABC symbols (`C` = middle C,
// lowercase one octave up, `'` and `,` for further octaves, `^` for sharps)
// and as MusicXML step/alter/octave triples. Both use sharps only, so every
// pitch has exactly one spelling and `symbol_to_midi` can invert
// `midi_to_symbol`.

/// Pitch class names with sharps (ABC accidental prefix).
const ABC_NAMES: [&str; 12] = [
    "C", "^C", "D", "^D", "E", "F", "^F", "G", "^G", "A", "^A", "B",
];

/// (step, alter) per pitch class for MusicXML.
const STEPS: [(char, i8); 12] = [
    ('C', 0),
    ('C', 1),
    ('D', 0),
    ('D', 1),
    ('E', 0),
    ('F', 0),
    ('F', 1),
    ('G', 0),
    ('G', 1),
    ('A', 0),
    ('A', 1),
    ('B', 0),
];

/// Convert a MIDI pitch to an ABC note symbol.
///
/// MIDI 60 = `C`, 72 = `c`, 84 = `c'`, 48 = `C,`.
pub fn midi_to_symbol(pitch: u8) -> String {
    let pitch = pitch.min(127);
    let name = ABC_NAMES[(pitch % 12) as usize];
    let octave = (pitch / 12) as i32; // 5 for MIDI 60..=71
    let mut out = String::with_capacity(name.len() + 4);
    if octave >= 6 {
        out.push_str(&name.to_ascii_lowercase());
        for _ in 0..(octave - 6) {
            out.push('\'');
        }
    } else {
        out.push_str(name);
        for _ in 0..(5 - octave) {
            out.push(',');
        }
    }
    out
}

/// Parse an ABC note symbol back into a MIDI pitch.
///
/// Accepts `^`/`^^`/`_`/`__`/`=` accidentals, a letter, and any run of
/// octave marks. Returns `None` for anything else or an out-of-range result.
pub fn symbol_to_midi(symbol: &str) -> Option<u8> {
    let mut chars = symbol.chars().peekable();
    let mut alter: i32 = 0;
    while let Some(&c) = chars.peek() {
        match c {
            '^' => alter += 1,
            '_' => alter -= 1,
            '=' => {}
            _ => break,
        }
        chars.next();
    }
    let letter = chars.next()?;
    let pc: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let mut octave: i32 = if letter.is_ascii_lowercase() { 6 } else { 5 };
    for c in chars {
        match c {
            '\'' => octave += 1,
            ',' => octave -= 1,
            _ => return None,
        }
    }
    let midi = octave * 12 + pc + alter;
    u8::try_from(midi).ok().filter(|&p| p <= 127)
}

/// Format a length in 1/16-beat grid steps as an ABC length suffix, with
/// `L:1/16` as the unit length (so four grid steps make one unit).
///
/// `4` → `""`, `8` → `"2"`, `2` → `"/2"`, `3` → `"3/4"`.
pub fn format_length(grid_steps: u32) -> String {
    let divisor = gcd(grid_steps, 4).max(1);
    let num = grid_steps / divisor;
    let den = 4 / divisor;
    match (num, den) {
        (1, 1) => String::new(),
        (n, 1) => n.to_string(),
        (1, d) => format!("/{d}"),
        (n, d) => format!("{n}/{d}"),
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// MusicXML pitch triple: (step letter, alter, octave). Middle C is octave 4.
pub fn pitch_parts(pitch: u8) -> (char, i8, i8) {
    let pitch = pitch.min(127);
    let (step, alter) = STEPS[(pitch % 12) as usize];
    (step, alter, (pitch / 12) as i8 - 1)
}

/// Nearest MIDI pitch for a frequency in Hz (A4 = 440 Hz = 69).
///
/// Non-positive or non-finite input maps to 0; the result is clamped to 127.
pub fn frequency_to_midi(freq: f64) -> u8 {
    if !freq.is_finite() || freq <= 0.0 {
        return 0;
    }
    let midi = 69.0 + 12.0 * (freq / 440.0).log2();
    midi.round().clamp(0.0, 127.0) as u8
}

/// Frequency in Hz of a MIDI pitch.
pub fn midi_to_frequency(pitch: u8) -> f64 {
    440.0 * 2f64.powf((pitch as f64 - 69.0) / 12.0)
}
