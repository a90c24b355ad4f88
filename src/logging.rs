use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// Log lines go to stderr so `--json` output on stdout stays parseable.
#[derive(Clone, Copy, Default)]
pub(crate) struct StderrMakeWriter;

impl<'a> MakeWriter<'a> for StderrMakeWriter {
    type Writer = std::io::Stderr;

    fn make_writer(&'a self) -> Self::Writer {
        std::io::stderr()
    }
}

pub(crate) fn init(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(StderrMakeWriter)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
