use crate::importer::{ImportOutcome, ImportReport};
use crate::ui::theme;
use crate::ui::Icons;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

/// Progress bar over the users of one import run; hidden when stdout is not a terminal
pub struct ImportProgress {
    bar: ProgressBar,
}

impl ImportProgress {
    pub fn new(total_users: usize) -> Self {
        let bar = if console::Term::stdout().is_term() {
            ProgressBar::new(total_users as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Record one finished user, printing a line above the bar
    pub fn finish_user(&self, username: &str, outcome: &crate::Result<ImportOutcome>) {
        let line = match outcome {
            Ok(ImportOutcome::Imported { created, urls, visits, .. }) => format!(
                "{} {} {}",
                if *created { Icons::NEW } else { Icons::MOD },
                username,
                format!("({} urls, {} visits)", urls, visits).style(theme().muted.clone())
            ),
            Ok(ImportOutcome::Unchanged { .. }) => format!(
                "  {} {}",
                username.style(theme().muted.clone()),
                "(unchanged)".style(theme().muted.clone())
            ),
            Err(e) => format!(
                "{} {}: {}",
                Icons::CROSS,
                username,
                e.to_string().style(theme().error.clone())
            ),
        };
        if self.bar.is_hidden() {
            println!("{}", line);
        } else {
            self.bar.println(line);
        }
        self.bar.set_message(username.to_string());
        self.bar.inc(1);
    }

    pub fn finish_with_summary(&self, duration: Duration, report: &ImportReport) {
        self.bar.finish_and_clear();
        println!();
        let style = if report.is_success() {
            theme().success.clone()
        } else {
            theme().warn.clone()
        };
        println!(
            "{} {}",
            Icons::CHECK.style(style.clone()),
            format!("Complete in {}", HumanDuration(duration)).style(style)
        );
        println!(
            "  {} {}  {} {}  {} {}",
            Icons::UP.style(theme().info.clone()),
            report.imported(),
            Icons::GEAR.style(theme().info.clone()),
            report.unchanged(),
            Icons::CROSS.style(theme().info.clone()),
            report.failures().len()
        );
    }
}
