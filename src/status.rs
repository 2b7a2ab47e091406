use log::info;

/// Receiver for the single human-readable status line.
pub trait StatusSink {
    fn show(&mut self, text: &str);
}

/// Keeps the most recent line in memory.
#[derive(Debug, Default, Clone)]
pub struct StatusLine {
    current: Option<String>,
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

impl StatusSink for StatusLine {
    fn show(&mut self, text: &str) {
        self.current = Some(text.to_string());
    }
}

/// Sends status lines to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn show(&mut self, text: &str) {
        info!("{text}");
    }
}

/// Prints status lines on stdout, one per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintStatus;

impl StatusSink for PrintStatus {
    fn show(&mut self, text: &str) {
        println!("{text}");
    }
}

impl<S: StatusSink + ?Sized> StatusSink for Box<S> {
    fn show(&mut self, text: &str) {
        (**self).show(text);
    }
}
