use basemap::ChangeType;
use colored::Color;
use once_cell::sync::Lazy;

/// Colours used by the CLI, including those for change reports.
pub struct ColorTheme {
    pub success: Color,
    pub error: Color,
    pub warning: Color,
    pub info: Color,
    pub highlight: Color,
    pub muted: Color,
    pub primary: Color,
    pub secondary: Color,
    pub key: Color,
    pub value: Color,
    pub added: Color,
    pub removed: Color,
    pub modified: Color,
}

impl ColorTheme {
    pub fn for_change(&self, change_type: ChangeType) -> Color {
        match change_type {
            ChangeType::Added => self.added,
            ChangeType::Removed => self.removed,
            ChangeType::Modified => self.modified,
        }
    }
}

pub static THEME: Lazy<ColorTheme> = Lazy::new(|| ColorTheme {
    success: Color::Green,
    error: Color::Red,
    warning: Color::Yellow,
    info: Color::Blue,
    highlight: Color::Cyan,
    muted: Color::BrightBlack,
    primary: Color::BrightBlue,
    secondary: Color::Magenta,
    key: Color::BrightCyan,
    value: Color::White,
    added: Color::Green,
    removed: Color::Red,
    modified: Color::Yellow,
});

pub struct Icons {
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
    pub arrow: &'static str,
    pub bullet: &'static str,
    pub loading: &'static str,
    /// Marks a written document.
    pub file: &'static str,
}

pub const ICONS: Icons = Icons {
    success: "✓",
    error: "✗",
    warning: "⚠",
    info: "ℹ",
    arrow: "→",
    bullet: "•",
    loading: "⟳",
    file: "📄",
};
