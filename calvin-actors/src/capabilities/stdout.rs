use calvin_core::capability::{Capability, CapabilityFactory, OpenContext};
use calvin_core::CapabilityError;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::Arc;

pub const STDOUT: &str = "io.stdout";

/// Where `io.stdout` lines end up
#[derive(Debug, Clone)]
pub enum LineSink {
    Stdout,
    /// Collect lines in memory
    Buffer(Arc<Mutex<Vec<String>>>),
}

impl LineSink {
    fn emit(&self, line: &str) -> std::io::Result<()> {
        match self {
            LineSink::Stdout => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{}", line)?;
                out.flush()
            }
            LineSink::Buffer(lines) => {
                lines.lock().push(line.to_string());
                Ok(())
            }
        }
    }
}

/// Opens `io.stdout` objects; every object shares the factory's sink
#[derive(Debug, Clone)]
pub struct StdoutFactory {
    sink: LineSink,
}

impl StdoutFactory {
    pub fn new(sink: LineSink) -> Self {
        Self { sink }
    }
}

impl CapabilityFactory for StdoutFactory {
    fn name(&self) -> &str {
        STDOUT
    }

    fn open(
        &self,
        _ctx: OpenContext,
        args: &Map<String, Value>,
    ) -> Result<Box<dyn Capability>, CapabilityError> {
        let prefix = args
            .get("prefix")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Box::new(StdoutWriter {
            sink: self.sink.clone(),
            prefix,
        }))
    }
}

struct StdoutWriter {
    sink: LineSink,
    prefix: String,
}

impl Capability for StdoutWriter {
    fn can_write(&self) -> bool {
        true
    }

    fn write(&mut self, data: Value) -> Result<(), CapabilityError> {
        let text = match data {
            Value::String(s) => s,
            other => other.to_string(),
        };
        self.sink
            .emit(&format!("{}{}", self.prefix, text))
            .map_err(|e| CapabilityError::Failed {
                name: STDOUT.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calvin_core::{ActorId, WakeupHandle};
    use serde_json::json;

    #[test]
    fn test_buffer_sink_formats_values() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let factory = StdoutFactory::new(LineSink::Buffer(lines.clone()));
        let (wakeup, _rx) = WakeupHandle::channel();
        let ctx = OpenContext {
            actor: ActorId::new("a"),
            wakeup,
        };

        let mut args = Map::new();
        args.insert("prefix".into(), json!("> "));
        let mut writer = factory.open(ctx, &args).unwrap();
        assert!(writer.can_write());
        assert!(!writer.can_read());

        writer.write(json!("hello")).unwrap();
        writer.write(json!({"n": 1})).unwrap();
        assert_eq!(*lines.lock(), vec!["> hello", "> {\"n\":1}"]);
    }
}
