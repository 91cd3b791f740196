use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame, Terminal,
};

use crate::config::current_theme_color;

pub type Term = Terminal<ratatui::backend::CrosstermBackend<std::io::Stdout>>;

// ── Padding ───────────────────────────────────────────────────────────────────
const H_PAD: u16 = 1;

/// Shrink a rect by H_PAD columns on each side.
pub fn pad_horizontal(area: Rect) -> Rect {
    let pad = H_PAD.min(area.width / 2);
    Rect {
        x: area.x + pad,
        y: area.y,
        width: area.width.saturating_sub(pad * 2),
        height: area.height,
    }
}

// ── Color helpers ─────────────────────────────────────────────────────────────

pub fn normal_style()   -> Style { Style::default().fg(current_theme_color()) }
pub fn sel_style()      -> Style { Style::default().fg(Color::Black).bg(current_theme_color()).add_modifier(Modifier::BOLD) }
pub fn title_style()    -> Style { Style::default().fg(current_theme_color()).add_modifier(Modifier::BOLD) }
pub fn dim_style()      -> Style { Style::default().fg(current_theme_color()).add_modifier(Modifier::DIM) }
pub fn good_style()     -> Style { Style::default().fg(Color::Green).add_modifier(Modifier::BOLD) }
pub fn bad_style()      -> Style { Style::default().fg(Color::Red).add_modifier(Modifier::BOLD) }

// ── Text rows ─────────────────────────────────────────────────────────────────

/// Overwrite `buf` from `start`, clipping at the end.
pub fn write_text(buf: &mut [char], start: usize, text: &str) {
    for (i, ch) in text.chars().enumerate() {
        let idx = start + i;
        if idx >= buf.len() {
            break;
        }
        buf[idx] = ch;
    }
}

pub fn write_text_in_area(buf: &mut [char], area: Rect, x: u16, text: &str) {
    if x < area.x {
        return;
    }
    let start = (x - area.x) as usize;
    write_text(buf, start, text);
}

pub fn format_menu_row(width: usize, label: &str, right: Option<&str>) -> String {
    if width == 0 {
        return String::new();
    }
    let mut chars = vec![' '; width];
    write_text(&mut chars, 0, &format!(" {}", label));
    if let Some(right) = right {
        let len = right.chars().count();
        if width > len {
            write_text(&mut chars, width - len - 1, right);
        }
    }
    chars.into_iter().collect()
}

pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ── Layout ────────────────────────────────────────────────────────────────────

pub fn text_width(text: &str) -> u16 {
    u16::try_from(text.chars().count()).unwrap_or(u16::MAX)
}

/// One row of `area`, `offset` rows down, or `None` once past the bottom.
pub fn row(area: Rect, offset: u16) -> Option<Rect> {
    (offset < area.height).then(|| Rect {
        x: area.x,
        y: area.y + offset,
        width: area.width,
        height: 1,
    })
}

pub fn contains(r: Rect, x: u16, y: u16) -> bool {
    x >= r.x && x < r.x.saturating_add(r.width) && y >= r.y && y < r.y.saturating_add(r.height)
}

/// First control whose last-rendered rect covers `(x, y)`.
pub fn hit<T: Copy>(hits: &[(Rect, T)], x: u16, y: u16) -> Option<T> {
    hits.iter().find(|(r, _)| contains(*r, x, y)).map(|(_, t)| *t)
}

pub fn hit_index<T>(hits: &[(Rect, T)], x: u16, y: u16) -> Option<usize> {
    hits.iter().position(|(r, _)| contains(*r, x, y))
}

// ── Widgets ───────────────────────────────────────────────────────────────────

pub fn text_line(f: &mut Frame, area: Rect, offset: u16, text: &str, style: Style) {
    if let Some(r) = row(area, offset) {
        f.render_widget(
            Paragraph::new(Line::from(Span::styled(truncate(text, r.width as usize), style))),
            r,
        );
    }
}

pub fn centered_line(f: &mut Frame, area: Rect, offset: u16, text: &str, style: Style) {
    if let Some(r) = row(area, offset) {
        let w = text_width(text).min(r.width);
        let x = r.x + (r.width - w) / 2;
        f.render_widget(
            Paragraph::new(Span::styled(truncate(text, w as usize), style)),
            Rect { x, width: w, ..r },
        );
    }
}

/// Buttons laid out left to right, centered on one row. Returns each button's
/// rect in order; buttons that do not fit get an empty rect.
pub fn button_row(
    f: &mut Frame,
    area: Rect,
    offset: u16,
    labels: &[String],
    focused: Option<usize>,
) -> Vec<Rect> {
    let Some(r) = row(area, offset) else {
        return vec![Rect::default(); labels.len()];
    };
    let texts: Vec<String> = labels.iter().map(|l| format!("[ {l} ]")).collect();
    let total: u16 = texts.iter().map(|t| text_width(t) + 1).sum::<u16>().saturating_sub(1);
    let mut x = r.x + r.width.saturating_sub(total) / 2;
    let right = r.x + r.width;
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let w = text_width(t);
            if x + w > right {
                return Rect::default();
            }
            let rect = Rect { x, y: r.y, width: w, height: 1 };
            let style = if focused == Some(i) { sel_style() } else { title_style() };
            f.render_widget(Paragraph::new(Span::styled(t.as_str(), style)), rect);
            x += w + 1;
            rect
        })
        .collect()
}

/// Single-line input box; shows a cursor block while focused.
pub fn input_box(f: &mut Frame, area: Rect, offset: u16, value: &str, placeholder: &str, focused: bool) -> Rect {
    let Some(r) = row(area, offset) else {
        return Rect::default();
    };
    let inner = r.width.saturating_sub(2) as usize;
    let (text, style) = if value.is_empty() && !focused {
        (placeholder.to_string(), dim_style())
    } else {
        let shown: String = value
            .chars()
            .rev()
            .take(inner.saturating_sub(1))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let cursor = if focused { "█" } else { "" };
        (format!("{shown}{cursor}"), normal_style())
    };
    let mut chars = vec![' '; inner];
    write_text(&mut chars, 0, &text);
    let body: String = chars.into_iter().collect();
    let frame_style = if focused { title_style() } else { dim_style() };
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("[", frame_style),
            Span::styled(body, style),
            Span::styled("]", frame_style),
        ])),
        r,
    );
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_text_clips() {
        let mut buf = vec![' '; 5];
        write_text(&mut buf, 3, "abc");
        assert_eq!(buf.iter().collect::<String>(), "   ab");
    }

    #[test]
    fn menu_row_places_right_label() {
        assert_eq!(format_menu_row(10, "Memory", Some("M")), " Memory M ");
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("Granada", 4), "Gra…");
        assert_eq!(truncate("Arch", 4), "Arch");
    }

    #[test]
    fn hit_finds_control() {
        let hits = [(Rect::new(0, 0, 4, 1), 'a'), (Rect::new(5, 0, 4, 1), 'b')];
        assert_eq!(hit(&hits, 6, 0), Some('b'));
        assert_eq!(hit(&hits, 4, 0), None);
        assert_eq!(hit_index(&hits, 1, 0), Some(0));
    }
}
