use rand::Rng;

const USER_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Human-typable code shown to the user during the device flow.
pub fn user_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| USER_CODE_ALPHABET[rng.gen_range(0..USER_CODE_ALPHABET.len())] as char)
        .collect()
}
