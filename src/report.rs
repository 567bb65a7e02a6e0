//! Colored console output
//!
//! ERROR HANDLING STRATEGY FOR DECORATIVE I/O:
//! All termcolor operations use `let _ =` to deliberately ignore errors.
//! If stderr/stdout is unavailable (broken pipe, no TTY), output is dropped
//! and the query carries on.

use std::io::Write;
use termcolor::{BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

use crate::compare::ComparisonReport;
use crate::normalize::CertificateMetadata;

/// Print a warning to stderr in yellow
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        use termcolor::WriteColor as _;
        let bufwtr = termcolor::BufferWriter::stderr(termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = buffer.set_color(termcolor::ColorSpec::new().set_fg(Some(termcolor::Color::Yellow)));
        let _ = write!(&mut buffer, "⚠️  ");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = bufwtr.print(&buffer);
    }};
}

/// Print an error to stderr in red
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        use termcolor::WriteColor as _;
        let bufwtr = termcolor::BufferWriter::stderr(termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = buffer.set_color(termcolor::ColorSpec::new().set_fg(Some(termcolor::Color::Red)));
        let _ = write!(&mut buffer, "❌ ");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = bufwtr.print(&buffer);
    }};
}

/// Print a success message to stdout in green
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        use termcolor::WriteColor as _;
        let bufwtr = termcolor::BufferWriter::stdout(termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = buffer.set_color(termcolor::ColorSpec::new().set_fg(Some(termcolor::Color::Green)));
        let _ = write!(&mut buffer, "✓ ");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = bufwtr.print(&buffer);
    }};
}

/// The three-line description printed for the chosen certificate.
#[must_use]
pub fn summary(record: &CertificateMetadata) -> String {
    format!(
        "Using Certificate: {}\n{}\nValidity: {} - {}",
        record.friendly_name, record.subject_name, record.effective_date, record.expiration_date
    )
}

pub fn print_summary(record: &CertificateMetadata) {
    let bufwtr = BufferWriter::stdout(ColorChoice::Auto);
    let mut buffer = bufwtr.buffer();
    let _ = writeln!(&mut buffer, "{}", summary(record));
    let _ = bufwtr.print(&buffer);
}

/// Per-field table for a cross-validation run, mismatches in red.
pub fn write_comparison<W: WriteColor>(buffer: &mut W, report: &ComparisonReport) {
    if report.primary_count != report.secondary_count {
        let _ = buffer.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
        let _ = writeln!(
            buffer,
            "Result count differs: {} vs {}",
            report.primary_count, report.secondary_count
        );
        let _ = buffer.reset();
    }

    for field in &report.fields {
        let (color, mark) = if field.matches {
            (Color::Green, "pass")
        } else {
            (Color::Red, "FAIL")
        };
        let _ = buffer.set_color(ColorSpec::new().set_fg(Some(color)));
        let _ = write!(buffer, "[{mark}]");
        let _ = buffer.reset();
        let _ = writeln!(buffer, " #{} {}", field.index, field.field);

        if !field.matches {
            let _ = writeln!(buffer, "   primary:   {}", field.primary);
            let _ = writeln!(buffer, "   secondary: {}", field.secondary);
        }
    }

    let _ = buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
    let _ = writeln!(buffer, "All fields match: {}", report.all_match);
    let _ = buffer.reset();
}
