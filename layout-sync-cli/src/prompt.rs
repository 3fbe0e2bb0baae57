//! Conflict prompts on the terminal.

use std::io::{self, BufRead, Write};

use layout_sync_core::{ChannelPrompter, ConflictOption, ConflictPrompt, Resolution};

/// Answers conflict prompts on stdin/stdout from a background task.
///
/// Must be called from within a tokio runtime.
pub fn spawn_terminal_prompter() -> ChannelPrompter {
    let (prompter, mut requests) = ChannelPrompter::new(1);

    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let prompt = request.prompt.clone();
            let resolution = tokio::task::spawn_blocking(move || {
                let stdin = io::stdin();
                let stdout = io::stdout();
                ask(&prompt, &mut stdin.lock(), &mut stdout.lock())
                    .unwrap_or(Resolution::Cancel)
            })
            .await
            .unwrap_or(Resolution::Cancel);
            request.resolve(resolution);
        }
    });

    prompter
}

fn option_label(option: ConflictOption) -> &'static str {
    match option {
        ConflictOption::Discard => "[d]iscard my changes",
        ConflictOption::Overwrite => "[o]verwrite theirs",
        ConflictOption::Fork => "[f]ork a copy",
        ConflictOption::Cancel => "[c]ancel",
    }
}

/// Maps a typed answer onto one of the offered options.
fn parse_answer(input: &str, options: &[ConflictOption]) -> Option<ConflictOption> {
    let option = match input.trim().to_lowercase().as_str() {
        "d" | "discard" => ConflictOption::Discard,
        "o" | "overwrite" => ConflictOption::Overwrite,
        "f" | "fork" => ConflictOption::Fork,
        "c" | "cancel" => ConflictOption::Cancel,
        _ => return None,
    };
    options.contains(&option).then_some(option)
}

/// Asks until a valid option is chosen. End of input cancels.
fn ask<R: BufRead, W: Write>(
    prompt: &ConflictPrompt,
    input: &mut R,
    output: &mut W,
) -> io::Result<Resolution> {
    writeln!(output)?;
    writeln!(output, "{}", prompt.title)?;
    writeln!(output, "  Your version:   {}", prompt.local_saved_at.to_rfc3339())?;
    writeln!(output, "  Server version: {}", prompt.remote_saved_at.to_rfc3339())?;

    let labels: Vec<&str> = prompt.options.iter().map(|o| option_label(*o)).collect();

    let option = loop {
        write!(output, "{}? ", labels.join(", "))?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(Resolution::Cancel);
        }
        match parse_answer(&line, &prompt.options) {
            Some(option) => break option,
            None => writeln!(output, "Please choose one of the listed options.")?,
        }
    };

    Ok(match option {
        ConflictOption::Discard => Resolution::Discard,
        ConflictOption::Overwrite => Resolution::Overwrite,
        ConflictOption::Cancel => Resolution::Cancel,
        ConflictOption::Fork => {
            write!(output, "Name for the copy [{}]: ", prompt.suggested_fork_name)?;
            output.flush()?;
            let mut name = String::new();
            input.read_line(&mut name)?;
            let name = name.trim();
            Resolution::Fork {
                name: if name.is_empty() {
                    prompt.suggested_fork_name.clone()
                } else {
                    name.to_string()
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use layout_sync_core::LayoutId;
    use std::io::Cursor;

    fn prompt(options: Vec<ConflictOption>) -> ConflictPrompt {
        ConflictPrompt {
            layout_id: LayoutId::from("L1"),
            layout_name: "Main".to_string(),
            title: "\"Main\" was changed on another device".to_string(),
            local_saved_at: Utc.timestamp_opt(140, 0).unwrap(),
            remote_saved_at: Utc.timestamp_opt(150, 0).unwrap(),
            options,
            suggested_fork_name: "Main (copy)".to_string(),
        }
    }

    fn all_options() -> Vec<ConflictOption> {
        vec![
            ConflictOption::Discard,
            ConflictOption::Overwrite,
            ConflictOption::Fork,
            ConflictOption::Cancel,
        ]
    }

    fn answer(options: Vec<ConflictOption>, typed: &str) -> (Resolution, String) {
        let mut input = Cursor::new(typed.as_bytes().to_vec());
        let mut output = Vec::new();
        let resolution = ask(&prompt(options), &mut input, &mut output).unwrap();
        (resolution, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_parse_answer() {
        let options = all_options();
        assert_eq!(parse_answer("d\n", &options), Some(ConflictOption::Discard));
        assert_eq!(parse_answer(" Overwrite ", &options), Some(ConflictOption::Overwrite));
        assert_eq!(parse_answer("x", &options), None);

        let read_only = vec![ConflictOption::Discard, ConflictOption::Fork, ConflictOption::Cancel];
        assert_eq!(parse_answer("o", &read_only), None);
    }

    #[test]
    fn test_ask_shows_prompt_and_reads_choice() {
        let (resolution, output) = answer(all_options(), "o\n");
        assert_eq!(resolution, Resolution::Overwrite);
        assert!(output.contains("changed on another device"));
        assert!(output.contains("[o]verwrite theirs"));
    }

    #[test]
    fn test_ask_repeats_on_invalid_answer() {
        let (resolution, output) = answer(all_options(), "maybe\nd\n");
        assert_eq!(resolution, Resolution::Discard);
        assert!(output.contains("Please choose one of the listed options."));
    }

    #[test]
    fn test_fork_uses_suggested_name_by_default() {
        let (resolution, _) = answer(all_options(), "f\n\n");
        assert_eq!(
            resolution,
            Resolution::Fork {
                name: "Main (copy)".to_string()
            }
        );

        let (resolution, _) = answer(all_options(), "f\nMy layout\n");
        assert_eq!(
            resolution,
            Resolution::Fork {
                name: "My layout".to_string()
            }
        );
    }

    #[test]
    fn test_end_of_input_cancels() {
        let (resolution, _) = answer(all_options(), "");
        assert_eq!(resolution, Resolution::Cancel);
    }
}
