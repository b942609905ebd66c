// Copyright 2019-2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! PIN protocol version 1, for both sides of the handshake.

use crate::api::rng::Rng;
use crate::ctap::data_formats::CoseKey;
use crate::ctap::status_code::Ctap2StatusCode;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use alloc::vec::Vec;
use hmac::Mac;
use p256::ecdh::EphemeralSecret;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const PIN_AUTH_LENGTH: usize = 16;
pub const PIN_TOKEN_LENGTH: usize = 32;
const AES_BLOCK_SIZE: usize = 16;

/// An ephemeral P-256 key used for one key agreement.
pub struct KeyAgreementKey {
    secret: EphemeralSecret,
}

impl KeyAgreementKey {
    pub fn random(rng: &mut impl Rng) -> Self {
        KeyAgreementKey {
            secret: EphemeralSecret::random(rng),
        }
    }

    pub fn public_key(&self) -> CoseKey {
        CoseKey::from_ecdh_public_key(&self.secret.public_key())
    }

    /// Processes the peer's encapsulated CoseKey and returns the shared secret.
    pub fn decapsulate(&self, peer_cose_key: &CoseKey) -> Result<SharedSecret, Ctap2StatusCode> {
        let peer_public_key = peer_cose_key.to_public_key()?;
        let shared_secret = self.secret.diffie_hellman(&peer_public_key);
        let mut handshake = [0; 32];
        handshake.copy_from_slice(shared_secret.raw_secret_bytes().as_slice());
        let shared = SharedSecret::new(&handshake);
        handshake.zeroize();
        Ok(shared)
    }
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    common_secret: [u8; 32],
}

impl SharedSecret {
    /// Creates a new shared secret from the handshake result.
    fn new(handshake: &[u8; 32]) -> Self {
        let mut common_secret = [0; 32];
        common_secret.copy_from_slice(&Sha256::digest(handshake));
        SharedSecret { common_secret }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, Ctap2StatusCode> {
        if plaintext.len() % AES_BLOCK_SIZE != 0 {
            return Err(Ctap2StatusCode::CTAP1_ERR_INVALID_PARAMETER);
        }
        let iv = [0u8; AES_BLOCK_SIZE];
        let mut encryptor =
            cbc::Encryptor::<aes::Aes256>::new_from_slices(&self.common_secret, &iv)
                .map_err(|_| Ctap2StatusCode::CTAP2_ERR_VENDOR_INTERNAL_ERROR)?;
        let mut ciphertext = plaintext.to_vec();
        for block in ciphertext.chunks_exact_mut(AES_BLOCK_SIZE) {
            encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        Ok(ciphertext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, Ctap2StatusCode> {
        if ciphertext.len() % AES_BLOCK_SIZE != 0 {
            return Err(Ctap2StatusCode::CTAP1_ERR_INVALID_PARAMETER);
        }
        let iv = [0u8; AES_BLOCK_SIZE];
        let mut decryptor =
            cbc::Decryptor::<aes::Aes256>::new_from_slices(&self.common_secret, &iv)
                .map_err(|_| Ctap2StatusCode::CTAP2_ERR_VENDOR_INTERNAL_ERROR)?;
        let mut plaintext = ciphertext.to_vec();
        for block in plaintext.chunks_exact_mut(AES_BLOCK_SIZE) {
            decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        Ok(plaintext)
    }

    pub fn authenticate(&self, message: &[u8]) -> Result<Vec<u8>, Ctap2StatusCode> {
        authenticate_pin_uv_auth_token(&self.common_secret, message)
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), Ctap2StatusCode> {
        verify_pin_uv_auth_token(&self.common_secret, message, signature)
    }
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; 32], Ctap2StatusCode> {
    let mut hmac = <hmac::Hmac<Sha256> as Mac>::new_from_slice(key)
        .map_err(|_| Ctap2StatusCode::CTAP2_ERR_VENDOR_INTERNAL_ERROR)?;
    hmac.update(message);
    let mut output = [0; 32];
    output.copy_from_slice(&hmac.finalize().into_bytes());
    Ok(output)
}

/// Computes the left 16 bytes of the HMAC-SHA-256, as pinAuth does in version 1.
pub fn authenticate_pin_uv_auth_token(
    token: &[u8],
    message: &[u8],
) -> Result<Vec<u8>, Ctap2StatusCode> {
    Ok(hmac_sha256(token, message)?[..PIN_AUTH_LENGTH].to_vec())
}

/// Verifies a pinAuth in constant time.
pub fn verify_pin_uv_auth_token(
    token: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), Ctap2StatusCode> {
    if signature.len() != PIN_AUTH_LENGTH {
        return Err(Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_INVALID);
    }
    let mac = hmac_sha256(token, message)?;
    if bool::from(mac[..PIN_AUTH_LENGTH].ct_eq(signature)) {
        Ok(())
    } else {
        Err(Ctap2StatusCode::CTAP2_ERR_PIN_AUTH_INVALID)
    }
}

/// Returns LEFT(SHA-256(pin), 16).
pub fn pin_hash(pin: &[u8]) -> [u8; 16] {
    let mut hash = [0; 16];
    hash.copy_from_slice(&Sha256::digest(pin)[..16]);
    hash
}

/// Pads a PIN with zeros to the given length, longer PINs are returned unchanged.
pub fn pad_pin(pin: &[u8], padded_length: usize) -> Vec<u8> {
    let mut padded_pin = pin.to_vec();
    if padded_pin.len() < padded_length {
        padded_pin.resize(padded_length, 0x00);
    }
    padded_pin
}
