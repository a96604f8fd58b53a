//! Drains runner events and renders them on the terminal.

use common::events::TaskEvent;
use indicatif::{ProgressBar, ProgressStyle};

fn print_line(bar: &Option<ProgressBar>, line: &str) {
    match bar {
        Some(bar) => bar.println(line),
        None => println!("{line}"),
    }
}

/// Consume the event channel until the runner closes it, rendering logs,
/// the task list and (optionally) a progress bar.
pub async fn drain(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<TaskEvent>,
    show_progress: bool,
) {
    let bar = show_progress.then(|| {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .unwrap()
            .progress_chars("=> "),
        );
        bar
    });
    while let Some(event) = rx.recv().await {
        match event {
            TaskEvent::ProgressMax(max) => {
                if let Some(bar) = &bar {
                    bar.set_length(max);
                    bar.set_position(0);
                }
            }
            TaskEvent::ProgressValue(value) => {
                if let Some(bar) = &bar {
                    bar.set_position(value);
                }
            }
            TaskEvent::Log(line) => print_line(&bar, &line),
            TaskEvent::TaskListChanged(views) => {
                let mut text = String::from("tasks:");
                for view in &views {
                    text.push_str(&format!("\n  {} ... [{}]", view.name, view.state));
                }
                print_line(&bar, &text);
            }
        }
    }
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}
