use std::io::{stdout, Stdout};
use std::time::Duration;

use crate::error::PopError;
use crate::gui::error::GuiError;
use crate::rolling_buffer::RollingBuffer;
use crate::sync_loop::{DisplayEvent, PlotSurface};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::warn;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType},
    Frame, Terminal,
};

/// Fixed y range of one plot.
#[derive(Debug, Clone, Copy)]
struct YRange {
    lo: f64,
    hi: f64,
}

/// The force plot over the onset plot, drawn in the terminal.
pub struct TuiPlots<B: Backend> {
    terminal: Terminal<B>,
    interactive: bool,
    sensor_points: Vec<(f64, f64)>,
    onset_points: Option<Vec<(f64, f64)>>,
    sensor_range: YRange,
    onset_range: YRange,
}

impl TuiPlots<CrosstermBackend<Stdout>> {
    /// Take over the terminal. With `with_onset` false only the force plot
    /// is drawn. `sensor_max` caps the force axis.
    pub fn open(sensor_max: f64, with_onset: bool) -> Result<Self, GuiError> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        terminal.clear()?;
        Ok(Self::new(terminal, true, sensor_max, with_onset))
    }

    /// Give the terminal back. Also done on drop.
    pub fn close(&mut self) -> Result<(), GuiError> {
        if !self.interactive {
            return Ok(());
        }
        self.interactive = false;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl<B: Backend> TuiPlots<B> {
    fn new(terminal: Terminal<B>, interactive: bool, sensor_max: f64, with_onset: bool) -> Self {
        Self {
            terminal,
            interactive,
            sensor_points: Vec::new(),
            onset_points: with_onset.then(Vec::new),
            sensor_range: YRange {
                lo: 0.0,
                hi: sensor_max,
            },
            onset_range: YRange { lo: -0.1, hi: 1.0 },
        }
    }

    /// Draw on any backend without touching the real terminal or reading
    /// keys.
    pub fn headless(terminal: Terminal<B>, sensor_max: f64, with_onset: bool) -> Self {
        Self::new(terminal, false, sensor_max, with_onset)
    }

    /// The backend, to inspect what was drawn.
    pub fn backend(&self) -> &B {
        self.terminal.backend()
    }

    fn draw(&mut self) -> Result<(), GuiError> {
        let sensor = &self.sensor_points;
        let onset = self.onset_points.as_deref();
        let (sensor_range, onset_range) = (self.sensor_range, self.onset_range);
        self.terminal.draw(|f| ui(f, sensor, onset, sensor_range, onset_range))?;
        Ok(())
    }

    fn poll_quit(&self) -> Result<bool, GuiError> {
        if !self.interactive {
            return Ok(false);
        }
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

impl<B: Backend> PlotSurface for TuiPlots<B> {
    fn set_sensor(&mut self, data: &RollingBuffer) {
        self.sensor_points = data.points();
    }

    fn set_onset(&mut self, data: &RollingBuffer) {
        if let Some(points) = self.onset_points.as_mut() {
            *points = data.points();
        }
    }

    fn request_redraw(&mut self) -> Result<DisplayEvent, PopError> {
        self.draw()?;
        if self.poll_quit()? {
            Ok(DisplayEvent::Quit)
        } else {
            Ok(DisplayEvent::Continue)
        }
    }
}

impl<B: Backend> Drop for TuiPlots<B> {
    fn drop(&mut self) {
        if self.interactive {
            self.interactive = false;
            if let Err(e) = disable_raw_mode() {
                warn!("Could not restore terminal: {}", e);
            }
            let _ = execute!(stdout(), LeaveAlternateScreen);
        }
    }
}

fn line_chart<'a>(
    title: &'a str,
    points: &'a [(f64, f64)],
    range: YRange,
    color: Color,
) -> Chart<'a> {
    let x_max = points.len().saturating_sub(1).max(1) as f64;
    Chart::new(vec![Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(points)])
    .block(Block::default().title(title).borders(Borders::ALL))
    .x_axis(
        Axis::default()
            .style(Style::default().fg(Color::White))
            .bounds([0.0, x_max]),
    )
    .y_axis(
        Axis::default()
            .style(Style::default().fg(Color::White))
            .bounds([range.lo, range.hi])
            .labels(
                [range.lo, range.hi]
                    .iter()
                    .map(|v| Span::from(format!("{:.1}", v)))
                    .collect(),
            ),
    )
}

fn ui(
    f: &mut Frame,
    sensor: &[(f64, f64)],
    onset: Option<&[(f64, f64)]>,
    sensor_range: YRange,
    onset_range: YRange,
) {
    let area: Rect = f.size();
    let force = line_chart(" Force (q to quit) ", sensor, sensor_range, Color::Red);
    match onset {
        Some(onset) => {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(area);
            f.render_widget(force, rows[0]);
            f.render_widget(
                line_chart(" Onset strength ", onset, onset_range, Color::Cyan),
                rows[1],
            );
        }
        None => f.render_widget(force, area),
    }
}
