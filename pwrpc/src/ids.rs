//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
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
//

//! Service and method identifier calculation.
//!
//! Services and methods are addressed on the wire by 32-bit ids derived from
//! their names, so a caller holding only the name strings can address a
//! method without the generated descriptor.

/// Multiplier of the string hash used for RPC ids.
const HASH_CONSTANT: u32 = 65_599;

/// Calculates the wire id for a service or method name.
///
/// Services hash their fully qualified name (`pkg.Service`), methods hash
/// their bare name (`Method`). The hash is seeded with the byte length and
/// sums each UTF-8 byte times successive powers of 65599, wrapping at 32
/// bits. It is case-sensitive and maps the empty string to 0, which the
/// protocol reserves as "unset".
///
/// # Example
///
/// ```rust
/// use pwrpc::ids;
///
/// assert_eq!(ids::calculate(""), 0);
/// assert_eq!(ids::calculate("a"), 0x0061_17e0);
/// assert_ne!(ids::calculate("Read"), ids::calculate("read"));
/// ```
#[must_use]
pub fn calculate(name: &str) -> u32 {
    let bytes = name.as_bytes();
    let mut hash = bytes.len() as u32;
    let mut coefficient = HASH_CONSTANT;

    for &byte in bytes {
        hash = hash.wrapping_add(coefficient.wrapping_mul(u32::from(byte)));
        coefficient = coefficient.wrapping_mul(HASH_CONSTANT);
    }

    hash
}
