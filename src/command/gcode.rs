// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! G-code line validation.

/// Returns `true` if the line is a plausible single G-code instruction.
///
/// A valid line starts with a `G` or `M` word followed by digits, then any
/// number of parameters made of an uppercase letter and a number
/// (`X10`, `Z-0.4`, `S210`). Everything after a `;` is a comment.
///
/// # Examples
///
/// ```
/// use bambu_pool::command::is_valid_gcode_line;
///
/// assert!(is_valid_gcode_line("G1 X10 Y-2.5 F3000"));
/// assert!(is_valid_gcode_line("M400 ; wait"));
/// assert!(!is_valid_gcode_line("G1 X"));
/// assert!(!is_valid_gcode_line("; only a comment"));
/// ```
#[must_use]
pub fn is_valid_gcode_line(line: &str) -> bool {
    let code = line.split(';').next().unwrap_or_default().trim();

    let mut tokens = code.split_whitespace();
    let Some(word) = tokens.next() else {
        return false;
    };

    if !is_command_word(word) {
        return false;
    }

    tokens.all(is_parameter)
}

/// `G28`, `M104`: a G or M letter followed by at least one digit.
///
/// Extra characters after the digits are tolerated, matching a prefix test.
fn is_command_word(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some('G' | 'M')) && chars.next().is_some_and(|c| c.is_ascii_digit())
}

/// `X10`, `Z-0.4`: an uppercase letter, optional minus, digits, optional fraction.
fn is_parameter(token: &str) -> bool {
    let mut chars = token.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_uppercase()) {
        return false;
    }

    let number = chars.as_str();
    let number = number.strip_prefix('-').unwrap_or(number);
    let (int, frac) = match number.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (number, None),
    };

    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    all_digits(int) && frac.is_none_or(all_digits)
}
