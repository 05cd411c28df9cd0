//! Interactive menu: list, download everything, download by type or name,
//! check for new files, exit.

use std::io::{self, BufRead, Write};
use std::sync::atomic::Ordering;

use anyhow::Result;
use bucketdl_core::config::UPLOAD_PREFIX_CHARS;
use bucketdl_core::{RenameStrategy, filter_by_extension, filter_by_name};
use tracing::debug;

use crate::ProcessExit;
use crate::app::context::RunContext;
use crate::app::{exit_handler, output};

const MENU: &str = "
--- MENU ---
1. List all files
2. Download all files
3. Download files by type
4. Download files by name
5. Check for and download new files
6. Exit";

/// One menu entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MenuChoice {
    List,
    All,
    ByType,
    ByName,
    New,
    Exit,
}

pub(crate) fn parse_choice(input: &str) -> Option<MenuChoice> {
    match input.trim() {
        "1" => Some(MenuChoice::List),
        "2" => Some(MenuChoice::All),
        "3" => Some(MenuChoice::ByType),
        "4" => Some(MenuChoice::ByName),
        "5" => Some(MenuChoice::New),
        "6" => Some(MenuChoice::Exit),
        _ => None,
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes" | "s" | "sim"
    )
}

/// Line-oriented prompts over any reader/writer pair.
pub(crate) struct Prompter<R, W> {
    input: R,
    out: W,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    pub(crate) fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub(crate) fn new(input: R, out: W) -> Self {
        Self { input, out }
    }

    /// Shows `prompt` and reads one trimmed line; `None` at end of input.
    pub(crate) fn prompt_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.out, "{prompt}")?;
        self.out.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Asks a yes/no question; end of input counts as no.
    pub(crate) fn confirm(&mut self, question: &str) -> io::Result<bool> {
        Ok(self
            .prompt_line(&format!("{question} (y/n): "))?
            .is_some_and(|answer| is_yes(&answer)))
    }

    pub(crate) fn out(&mut self) -> &mut W {
        &mut self.out
    }

    #[cfg(test)]
    fn into_output(self) -> W {
        self.out
    }
}

/// Runs the menu loop until the user exits or input ends.
///
/// Returns [`ProcessExit::Failure`] if any download in the session had failures.
pub(crate) async fn run_menu<R: BufRead, W: Write>(
    ctx: &RunContext,
    urls: &[String],
    prompter: &mut Prompter<R, W>,
) -> Result<ProcessExit> {
    let mut session = ProcessExit::Success;

    loop {
        writeln!(prompter.out(), "{MENU}")?;
        let Some(answer) = prompter.prompt_line("Choose an option: ")? else {
            break;
        };
        let Some(choice) = parse_choice(&answer) else {
            writeln!(prompter.out(), "Invalid option. Try again.")?;
            continue;
        };
        debug!(?choice, "menu selection");

        let exit = match choice {
            MenuChoice::List => {
                writeln!(prompter.out(), "\nAvailable files:")?;
                output::write_urls(prompter.out(), urls, false)?;
                continue;
            }
            MenuChoice::All => {
                let rename = ask_rename(ctx, prompter)?;
                writeln!(prompter.out(), "\nDownloading all {} file(s)...", urls.len())?;
                download(ctx, urls, rename, prompter).await?
            }
            MenuChoice::ByType => {
                let Some(extension) =
                    prompter.prompt_line("\nFile type to download (e.g. .jpg, .zip): ")?
                else {
                    break;
                };
                let selected = filter_by_extension(urls, &extension);
                let label = format!("of type {extension}");
                confirm_and_download(ctx, &selected, &label, prompter).await?
            }
            MenuChoice::ByName => {
                let Some(fragment) = prompter.prompt_line("\nPart of the file name to download: ")?
                else {
                    break;
                };
                let selected = filter_by_name(urls, &fragment);
                let label = format!("with names containing '{fragment}'");
                confirm_and_download(ctx, &selected, &label, prompter).await?
            }
            MenuChoice::New => {
                let fresh = ctx.new_candidates(urls).await?;
                if fresh.is_empty() {
                    writeln!(prompter.out(), "\nNo new files found.")?;
                    continue;
                }
                writeln!(prompter.out(), "\nNew files found:")?;
                output::write_urls(prompter.out(), &fresh, false)?;
                if !prompter.confirm("\nDownload the new files?")? {
                    continue;
                }
                let rename = ask_rename(ctx, prompter)?;
                download(ctx, &fresh, rename, prompter).await?
            }
            MenuChoice::Exit => {
                writeln!(prompter.out(), "Exiting...")?;
                break;
            }
        };
        if exit != ProcessExit::Success {
            session = exit;
        }
    }

    Ok(session)
}

async fn confirm_and_download<R: BufRead, W: Write>(
    ctx: &RunContext,
    selected: &[String],
    label: &str,
    prompter: &mut Prompter<R, W>,
) -> Result<ProcessExit> {
    writeln!(prompter.out(), "\nFound {} file(s) {label}.", selected.len())?;
    if selected.is_empty() {
        return Ok(ProcessExit::Success);
    }
    output::write_urls(prompter.out(), selected, false)?;
    if !prompter.confirm("\nDownload these files?")? {
        return Ok(ProcessExit::Success);
    }
    let rename = ask_rename(ctx, prompter)?;
    download(ctx, selected, rename, prompter).await
}

fn ask_rename<R: BufRead, W: Write>(
    ctx: &RunContext,
    prompter: &mut Prompter<R, W>,
) -> io::Result<RenameStrategy> {
    let chars = ctx.config.strip_prefix.unwrap_or(UPLOAD_PREFIX_CHARS);
    let strip = prompter.confirm(&format!(
        "Strip the first {chars} characters from each file name?"
    ))?;
    Ok(if strip {
        RenameStrategy::StripPrefix(chars)
    } else {
        RenameStrategy::None
    })
}

async fn download<R: BufRead, W: Write>(
    ctx: &RunContext,
    urls: &[String],
    rename: RenameStrategy,
    prompter: &mut Prompter<R, W>,
) -> Result<ProcessExit> {
    // A Ctrl-C pressed at a prompt must not cancel the next download.
    ctx.cancelled.store(false, Ordering::SeqCst);
    let summary = ctx.download(urls, rename).await?;
    output::write_summary(prompter.out(), &summary, false)?;
    Ok(exit_handler::determine_exit_outcome(&summary))
}
