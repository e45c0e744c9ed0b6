use super::encryption::{KdfParams, Sealed, NONCE_LEN, SALT_LEN};
use crate::errors::CoreError;

/// Magic bytes identifying a T2DB (Trading212 dashboard) profile file.
pub const MAGIC: &[u8; 4] = b"T2DB";

/// Current file format version.
pub const CURRENT_VERSION: u16 = 1;

/// magic(4) + version(2) + kdf(12) + salt(16) + nonce(12) + ciphertext_len(8)
pub const HEADER_SIZE: usize = 4 + 2 + 12 + SALT_LEN + NONCE_LEN + 8;

/// Encode sealed data into the on-disk layout:
///
/// ```text
/// [T2DB: 4B] [version: 2B LE] [memory_cost: 4B LE] [time_cost: 4B LE]
/// [parallelism: 4B LE] [salt: 16B] [nonce: 12B] [ciphertext_len: 8B LE]
/// [ciphertext: variable]
/// ```
pub fn encode(sealed: &Sealed) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + sealed.ciphertext.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&CURRENT_VERSION.to_le_bytes());
    buf.extend_from_slice(&sealed.kdf_params.memory_cost.to_le_bytes());
    buf.extend_from_slice(&sealed.kdf_params.time_cost.to_le_bytes());
    buf.extend_from_slice(&sealed.kdf_params.parallelism.to_le_bytes());
    buf.extend_from_slice(&sealed.salt);
    buf.extend_from_slice(&sealed.nonce);
    buf.extend_from_slice(&(sealed.ciphertext.len() as u64).to_le_bytes());
    buf.extend_from_slice(&sealed.ciphertext);
    buf
}

/// Parse and validate a profile file. Trailing bytes after the declared
/// ciphertext are ignored.
pub fn decode(data: &[u8]) -> Result<Sealed, CoreError> {
    if data.len() < HEADER_SIZE {
        return Err(CoreError::InvalidFileFormat(format!(
            "File too small to be a T2DB profile ({} bytes)",
            data.len()
        )));
    }

    let mut reader = Reader { data, offset: 0 };

    if reader.take::<4>()? != *MAGIC {
        return Err(CoreError::InvalidFileFormat(
            "Invalid magic bytes, not a T2DB profile".into(),
        ));
    }

    let version = u16::from_le_bytes(reader.take::<2>()?);
    if version == 0 || version > CURRENT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let kdf_params = KdfParams {
        memory_cost: u32::from_le_bytes(reader.take::<4>()?),
        time_cost: u32::from_le_bytes(reader.take::<4>()?),
        parallelism: u32::from_le_bytes(reader.take::<4>()?),
    };
    validate_kdf(&kdf_params)?;

    let salt = reader.take::<SALT_LEN>()?;
    let nonce = reader.take::<NONCE_LEN>()?;
    let ciphertext_len = u64::from_le_bytes(reader.take::<8>()?);

    let remaining = data.len() - reader.offset;
    if ciphertext_len > remaining as u64 {
        return Err(CoreError::InvalidFileFormat(format!(
            "File truncated: header declares {ciphertext_len} bytes of ciphertext, {remaining} present"
        )));
    }
    let end = reader.offset + ciphertext_len as usize;

    Ok(Sealed {
        kdf_params,
        salt,
        nonce,
        ciphertext: data[reader.offset..end].to_vec(),
    })
}

/// Crafted headers must not be able to demand absurd KDF work.
fn validate_kdf(params: &KdfParams) -> Result<(), CoreError> {
    if !(8..=1_048_576).contains(&params.memory_cost) {
        return Err(CoreError::InvalidFileFormat(format!(
            "KDF memory_cost out of range: {} KiB (expected 8..=1048576)",
            params.memory_cost
        )));
    }
    if !(1..=20).contains(&params.time_cost) {
        return Err(CoreError::InvalidFileFormat(format!(
            "KDF time_cost out of range: {} (expected 1..=20)",
            params.time_cost
        )));
    }
    if !(1..=16).contains(&params.parallelism) {
        return Err(CoreError::InvalidFileFormat(format!(
            "KDF parallelism out of range: {} (expected 1..=16)",
            params.parallelism
        )));
    }
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], CoreError> {
        let bytes = self
            .data
            .get(self.offset..self.offset + N)
            .ok_or_else(|| CoreError::InvalidFileFormat("Unexpected end of header".into()))?;
        self.offset += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}
