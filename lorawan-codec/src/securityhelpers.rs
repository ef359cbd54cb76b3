// Copyright (c) 2017-2020 Ivaylo Petrov
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//
// author: Ivaylo Petrov <ivajloip@gmail.com>

//! Implements the block constructions (B0, A_i) used to compute MICs and to
//! encrypt/decrypt FRMPayload, as defined by the LoRaWAN specification.
pub use generic_array;

use generic_array::typenum::U16;
use generic_array::GenericArray;

use super::keys::{Encrypter, Mac, MIC};

/// Computes a plain CMAC over `data` and keeps the first four bytes. Used for
/// JoinRequest and JoinAccept payloads, whose MIC does not depend on a
/// direction or frame counter.
pub fn calculate_mic<M: Mac>(data: &[u8], mut mac: M) -> MIC {
    mac.input(data);
    let result = mac.result();
    MIC([result[0], result[1], result[2], result[3]])
}

/// Computes the MIC of a data message (see LoRaWAN 1.0.3 §4.4).
///
/// `data` is the PHYPayload without the trailing MIC bytes, i.e. MHDR || FHDR
/// || FPort || FRMPayload. The direction and DevAddr are read back out of
/// that data; only the frame counter, which the caller has already resolved
/// to 32 bits, needs to be supplied explicitly.
pub fn calculate_data_mic<M: Mac>(data: &[u8], mut mac: M, fcnt: u32) -> MIC {
    let dir = (data[0] >> 5) & 0x01;
    let dev_addr = [data[1], data[2], data[3], data[4]];
    let b0 = [
        0x49,
        0x00,
        0x00,
        0x00,
        0x00,
        dir,
        dev_addr[0],
        dev_addr[1],
        dev_addr[2],
        dev_addr[3],
        (fcnt & 0xff) as u8,
        ((fcnt >> 8) & 0xff) as u8,
        ((fcnt >> 16) & 0xff) as u8,
        ((fcnt >> 24) & 0xff) as u8,
        0x00,
        data.len() as u8,
    ];
    mac.input(&b0);
    mac.input(data);
    let result = mac.result();
    MIC([result[0], result[1], result[2], result[3]])
}

/// Encrypts (or, symmetrically, decrypts) `data[start..end]` in place using
/// the keystream built from A_i blocks, per LoRaWAN 1.0.3 §4.3.3.1. The
/// direction and DevAddr are read out of `data` itself, mirroring
/// [`calculate_data_mic`].
pub fn encrypt_frm_data_payload<E: Encrypter>(
    data: &mut [u8],
    start: usize,
    end: usize,
    fcnt: u32,
    enc: &E,
) {
    let dir = (data[0] >> 5) & 0x01;
    let dev_addr = [data[1], data[2], data[3], data[4]];
    let mut block_counter: u16 = 1;
    let mut i = start;
    while i < end {
        let mut a = GenericArray::<u8, U16>::default();
        a[0] = 0x01;
        a[5] = dir;
        a[6] = dev_addr[0];
        a[7] = dev_addr[1];
        a[8] = dev_addr[2];
        a[9] = dev_addr[3];
        a[10] = (fcnt & 0xff) as u8;
        a[11] = ((fcnt >> 8) & 0xff) as u8;
        a[12] = ((fcnt >> 16) & 0xff) as u8;
        a[13] = ((fcnt >> 24) & 0xff) as u8;
        a[15] = (block_counter & 0xff) as u8;

        enc.encrypt_block(&mut a);

        let block_end = core::cmp::min(i + 16, end);
        for (j, byte) in data[i..block_end].iter_mut().enumerate() {
            *byte ^= a[j];
        }

        i = block_end;
        block_counter += 1;
    }
}
