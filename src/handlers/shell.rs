//! Shell command execution.

use std::sync::Arc;

use async_trait::async_trait;

use super::{HandlerResult, PacketHandler};
use crate::device::DeviceControl;
use crate::protocol::{opcode, PacketReader};
use crate::session::SessionHandle;

/// Command output larger than this is cut so the response still fits in
/// one packet alongside the other payload fields.
const MAX_OUTPUT_LEN: usize = 60 * 1024;

fn truncate_output(mut output: String) -> String {
    if output.len() > MAX_OUTPUT_LEN {
        let mut end = MAX_OUTPUT_LEN;
        while !output.is_char_boundary(end) {
            end -= 1;
        }
        output.truncate(end);
        output.push_str("\n[output truncated]");
    }
    output
}

/// Runs a shell command and returns its output and exit code.
pub struct ExecuteShellHandler {
    device: Arc<dyn DeviceControl>,
}

impl ExecuteShellHandler {
    pub fn new(device: Arc<dyn DeviceControl>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl PacketHandler for ExecuteShellHandler {
    fn opcode(&self) -> u8 {
        opcode::EXECUTE_SHELL
    }

    async fn handle(
        &self,
        reader: &mut PacketReader<'_>,
        session: &SessionHandle,
    ) -> HandlerResult<()> {
        let command = reader.read_string()?;

        let (success, output, exit_code) = match self.device.execute_shell(&command).await {
            Ok(result) => (result.success, result.output, result.exit_code),
            Err(e) => {
                tracing::warn!("Shell command failed to run: {}", e);
                (false, e.to_string(), -1)
            }
        };

        let output = truncate_output(output);
        session
            .send_packet(opcode::SHELL_EXECUTION_RESPONSE, |w| {
                w.write_u8(success as u8);
                w.write_string(&output);
                w.write_i32(exit_code);
            })
            .await;
        Ok(())
    }
}
