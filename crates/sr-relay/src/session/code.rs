//! Session code issuance

use rand::rngs::OsRng;
use rand::RngCore;

use sr_protocol::{SessionCode, SESSION_CODE_LENGTH};

/// Random bytes per code; each byte renders as two hex characters.
const CODE_BYTES: usize = SESSION_CODE_LENGTH / 2;

/// Draws six-character upper-case hex codes from the OS CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionCodeGenerator;

impl SessionCodeGenerator {
    /// Create a generator
    pub fn new() -> Self {
        Self
    }

    /// Draw one code. Uniqueness is not checked.
    pub fn generate(&self) -> SessionCode {
        let mut bytes = [0u8; CODE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        SessionCode::new(hex::encode_upper(bytes))
    }

    /// Draw codes until one is not `is_live`.
    ///
    /// The code space holds 16^6 values, so a live set of any realistic size
    /// makes a redraw rare.
    pub fn generate_unique(&self, is_live: impl Fn(&SessionCode) -> bool) -> SessionCode {
        loop {
            let code = self.generate();
            if !is_live(&code) {
                return code;
            }
            tracing::debug!("Session code {} already live, drawing again", code);
        }
    }
}
