// Encrypt a sentence under a fixed key, then recover it through nothing but
// the padding oracle.
use padding_oracle::{recover_message_with_progress, AttackConfig, CbcHarness, Progress};

use rand::{rngs::StdRng, SeedableRng};

const KEY: &str = "140b41b22a29beb4061bda66b6747e14";
const PLAINTEXT: &str = "This attack completely breaks any block cipher using CBC mode, given a \
                         padding oracle. Implementation should be switched to more secure \
                         modes, such as CTR.";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::init_with_level(log::Level::Info)?;

    let key: [u8; 16] = hex::decode(KEY)?
        .try_into()
        .map_err(|_| "demo key must be 16 bytes")?;
    let mut harness = CbcHarness::new(key, StdRng::from_entropy());
    let ciphertext = harness.encrypt(PLAINTEXT.as_bytes());
    println!("ciphertext: {}", hex::encode(&ciphertext));

    let config = AttackConfig {
        parallel_blocks: false,
        ..AttackConfig::default()
    };
    let message = recover_message_with_progress(&ciphertext, &harness, &config, &|progress| {
        if let Progress::Block { block, plaintext } = progress {
            println!("block {block:>2}: {}", String::from_utf8_lossy(&plaintext));
        }
    })?;

    println!("{}", String::from_utf8_lossy(&message));
    Ok(())
}
