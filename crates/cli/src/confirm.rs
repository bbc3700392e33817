//! Operator confirmation on the controlling terminal.

use std::io::{BufRead, Write};

use announcer::Confirm;

/// Asks on stdout and reads the answer from stdin. Only `y` or `Y` accepts;
/// end of input declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let stdin = std::io::stdin();
        ask(prompt, &mut stdin.lock(), &mut std::io::stdout())
    }
}

fn ask(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> bool {
    if write!(output, "{prompt}").and_then(|_| output.flush()).is_err() {
        return false;
    }
    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => is_yes(&answer),
    }
}

fn is_yes(answer: &str) -> bool {
    answer.trim_end_matches(['\r', '\n']).eq_ignore_ascii_case("y")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(input: &str) -> (bool, String) {
        let mut output = Vec::new();
        let accepted = ask("continue? y/n: ", &mut input.as_bytes(), &mut output);
        (accepted, String::from_utf8(output).unwrap())
    }

    #[test]
    fn yes_accepts() {
        assert_eq!(answer("y\n"), (true, "continue? y/n: ".to_string()));
        assert!(answer("Y\n").0);
    }

    #[test]
    fn anything_else_declines() {
        assert!(!answer("n\n").0);
        assert!(!answer("yes\n").0);
        assert!(!answer(" y\n").0);
        assert!(!answer("\n").0);
        assert!(!answer("").0);
    }
}
