use std::{io::stdout, path::PathBuf, time::Duration};

use crate::gui::error::GuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    backend::Backend,
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// Move the highlight through a list of `n` entries, wrapping at the ends.
fn move_cursor(cursor: usize, n: usize, code: KeyCode) -> usize {
    match code {
        KeyCode::Down => (cursor + 1) % n,
        KeyCode::Up => (cursor + n - 1) % n,
        _ => cursor,
    }
}

/// Lets the user pick the sensor's serial port from a list. Returns `None`
/// if they quit instead.
pub fn device_selector(mut available_ports: Vec<PathBuf>) -> Result<Option<PathBuf>, GuiError> {
    if available_ports.is_empty() {
        return Err(GuiError::NoPorts);
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let res = select_loop(&mut terminal, &available_ports);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(res?.map(|i| available_ports.swap_remove(i)))
}

fn select_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    available_ports: &[PathBuf],
) -> Result<Option<usize>, GuiError> {
    let mut cursor = 0;
    let mut list_state = ListState::default().with_selected(Some(cursor));
    let n_ports = available_ports.len();
    loop {
        let title = Title::from(" Sensor Port ".magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".magenta().bold(),
            " Select ".into(),
            "<Enter>".magenta().bold(),
            " Quit ".into(),
            "<Q> ".magenta().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let port_names = available_ports.iter().map(|p| p.to_string_lossy());
        let list = List::new(port_names)
            .style(Style::default().fg(Color::White))
            .highlight_symbol(">>")
            .highlight_style(Style::default().fg(Color::Magenta))
            .block(block);
        list_state.select(Some(cursor));
        terminal.draw(|frame| {
            let area = frame.size();
            frame.render_stateful_widget(list, area, &mut list_state);
        })?;
        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Enter => return Ok(Some(cursor)),
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(None),
                        code => cursor = move_cursor(cursor, n_ports, code),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps_both_ways() {
        assert_eq!(move_cursor(0, 3, KeyCode::Up), 2);
        assert_eq!(move_cursor(2, 3, KeyCode::Down), 0);
        assert_eq!(move_cursor(1, 3, KeyCode::Left), 1);
    }

    #[test]
    fn no_ports_is_an_error() {
        assert!(matches!(device_selector(vec![]), Err(GuiError::NoPorts)));
    }
}
