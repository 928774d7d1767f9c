//! Console logging for the boot stages.
//!
//! Every line carries the emitting stage as a fixed-width tag so output of
//! both stages lines up on the console:
//!
//! ```text
//! [    init    ] mount("proc", "/proc", "proc", 0x0, "")
//! [bluebox-init] stdout: hello
//! ```

use std::fmt;

use bluebox_shared::constants::log::TAG_WIDTH;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Event formatter that prefixes each line with a centered stage tag.
pub struct TaggedFormat {
    tag: String,
}

impl TaggedFormat {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: format!("[{:^width$}]", tag, width = TAG_WIDTH),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl<S, N> FormatEvent<S, N> for TaggedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{} ", self.tag)?;
        let level = *event.metadata().level();
        if level == Level::WARN || level == Level::ERROR {
            write!(writer, "{}: ", level)?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the console subscriber for the stage called `tag`.
///
/// Respects `RUST_LOG`; defaults to `info`. Output goes to stdout, which the
/// kernel connects to the console.
pub fn init(tag: &str) {
    if let Err(e) = tracing_subscriber::fmt()
        .event_format(TaggedFormat::new(tag))
        .with_writer(std::io::stdout)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
    {
        // Logging failure shouldn't stop the boot
        eprintln!("[ERROR] Failed to initialize tracing: {}", e);
    }
}
