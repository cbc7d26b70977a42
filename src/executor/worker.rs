//! The worker side of the process-parallel strategy
//!
//! A worker is set up once, then answers `Process` requests until it is told
//! to shut down or its input closes. Nothing else may write to its output
//! stream: logging goes to stderr.

use super::protocol::{read_message, write_frame, write_message, ProtocolError, Reply, Request};
use crate::processor::ProcessorRegistry;
use std::io::{self, BufReader, BufWriter, Read, Write};
use tracing::{debug, warn};

pub fn serve<R: Read, W: Write>(
    registry: &ProcessorRegistry,
    input: &mut R,
    output: &mut W,
) -> Result<(), ProtocolError> {
    let runner = match read_message(input)? {
        None => {
            debug!("Input closed before setup");
            return Ok(());
        }
        Some(Request::Setup {
            processor,
            state,
            context,
        }) => match registry.instantiate(&processor, state, context) {
            Ok(runner) => {
                debug!("Worker ready with processor `{}`", processor);
                write_message(output, &Reply::Ready)?;
                output.flush()?;
                runner
            }
            Err(reason) => {
                warn!("Rejecting setup: {}", reason);
                write_message(output, &Reply::Rejected { reason })?;
                output.flush()?;
                return Ok(());
            }
        },
        Some(other) => {
            return Err(ProtocolError::Unexpected(format!(
                "{other:?} before setup"
            )))
        }
    };

    loop {
        match read_message(input)? {
            None | Some(Request::Shutdown) => return Ok(()),
            Some(Request::Process { chunk }) => {
                match runner.run(&chunk) {
                    Ok(payload) => {
                        write_message(
                            output,
                            &Reply::Completed {
                                index: chunk.index,
                                entries: chunk.entries(),
                            },
                        )?;
                        write_frame(output, &payload)?;
                    }
                    Err(failure) => write_message(output, &Reply::Failed { failure })?,
                }
                output.flush()?;
            }
            Some(Request::Setup { .. }) => {
                return Err(ProtocolError::Unexpected("second setup".to_string()))
            }
        }
    }
}

/// Serve the protocol on this process's stdin and stdout
pub fn serve_stdio(registry: &ProcessorRegistry) -> Result<(), ProtocolError> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut input = BufReader::new(stdin.lock());
    let mut output = BufWriter::new(stdout.lock());
    serve(registry, &mut input, &mut output)
}
