// AES-128-CBC with PKCS#7 padding under a key the attacker never sees.
//
// Used as a self-contained padding oracle: `decrypt` succeeds only when the
// recovered plaintext carries valid padding.
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use rand::{rngs::StdRng, Rng};

use crate::{pkcs7_pad, pkcs7_unpad, OracleOutcome, PaddingOracle, AES_BLOCK_SIZE};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    #[error("ciphertext of {0} bytes is not an IV followed by whole blocks")]
    Length(usize),

    #[error("invalid padding")]
    PaddingInvalid,
}

pub struct CbcHarness {
    cipher: Aes128,
    rng: StdRng,
}

impl CbcHarness {
    pub fn new(key: [u8; AES_BLOCK_SIZE], rng: StdRng) -> Self {
        Self {
            cipher: Aes128::new(&key.into()),
            rng,
        }
    }

    /// A harness with a key drawn from `rng`.
    pub fn random(mut rng: StdRng) -> Self {
        let key: [u8; AES_BLOCK_SIZE] = rng.gen();
        Self::new(key, rng)
    }

    /// Pad and encrypt under a fresh random IV, returning `iv || ciphertext`.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let iv: [u8; AES_BLOCK_SIZE] = self.rng.gen();
        let padded = pkcs7_pad(plaintext, AES_BLOCK_SIZE as u8);

        let mut ciphertext = Vec::with_capacity(AES_BLOCK_SIZE + padded.len());
        ciphertext.extend_from_slice(&iv);
        let mut last_block = iv;
        for plaintext_block in padded.chunks(AES_BLOCK_SIZE) {
            let mut block = aes::Block::default();
            for ((b, p), l) in block.iter_mut().zip(plaintext_block).zip(&last_block) {
                *b = p ^ l;
            }
            self.cipher.encrypt_block(&mut block);
            ciphertext.extend_from_slice(&block);
            last_block.copy_from_slice(&block);
        }
        ciphertext
    }

    /// Decrypt `iv || ciphertext` and strip its padding.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, HarnessError> {
        if ciphertext.len() % AES_BLOCK_SIZE != 0 || ciphertext.len() < 2 * AES_BLOCK_SIZE {
            return Err(HarnessError::Length(ciphertext.len()));
        }
        let (iv, body) = ciphertext.split_at(AES_BLOCK_SIZE);

        let mut plaintext = Vec::with_capacity(body.len());
        let mut last_block = iv;
        for ciphertext_block in body.chunks(AES_BLOCK_SIZE) {
            let mut block = aes::Block::clone_from_slice(ciphertext_block);
            self.cipher.decrypt_block(&mut block);
            plaintext.extend(block.iter().zip(last_block).map(|(d, l)| d ^ l));
            last_block = ciphertext_block;
        }
        pkcs7_unpad(&mut plaintext, AES_BLOCK_SIZE).map_err(|_| HarnessError::PaddingInvalid)?;
        Ok(plaintext)
    }

    pub fn padding_valid(&self, predecessor: &[u8], target: &[u8]) -> bool {
        self.decrypt(&[predecessor, target].concat()).is_ok()
    }
}

impl PaddingOracle for CbcHarness {
    fn check(&self, predecessor: &[u8], target: &[u8]) -> OracleOutcome {
        self.padding_valid(predecessor, target).into()
    }
}
