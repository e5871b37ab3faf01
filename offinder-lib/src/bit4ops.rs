/*
Every nucleotide symbol maps to a 4 bit set of the bases it can stand for.
Two symbols are compatible when their sets intersect.
*/
const T: u8 = 0x1;
const C: u8 = 0x2;
const A: u8 = 0x4;
const G: u8 = 0x8;

const NCHRS: usize = 1 << 8;

pub fn cdiv(x: usize, y: usize) -> usize {
    (x + y - 1) / y
}

const fn makebit4map(mixed_base: bool) -> [u8; NCHRS] {
    let mut arr = [0_u8; NCHRS];
    arr['G' as usize] = G;
    arr['C' as usize] = C;
    arr['A' as usize] = A;
    arr['T' as usize] = T;
    if mixed_base {
        arr['R' as usize] = A | G;
        arr['Y' as usize] = C | T;
        arr['S' as usize] = G | C;
        arr['W' as usize] = A | T;
        arr['K' as usize] = G | T;
        arr['M' as usize] = A | C;
        arr['B' as usize] = C | G | T;
        arr['D' as usize] = A | G | T;
        arr['H' as usize] = A | C | T;
        arr['V' as usize] = A | C | G;
        arr['N' as usize] = A | C | G | T;
    }
    arr
}
const fn apply_lower(inarr: [u8; NCHRS]) -> [u8; NCHRS] {
    let mut arr = [0_u8; NCHRS];
    let mut i = 1;
    while i <= 26 {
        arr[i + 96] = inarr[i + 64];
        arr[i + 64] = inarr[i + 64];
        i += 1;
    }
    arr
}
const fn invert_chrmap(inarr: [u8; NCHRS]) -> [u8; NCHRS] {
    let mut arr = [0_u8; NCHRS];
    let mut i = 0;
    while i < NCHRS {
        // walk backwards so upper case wins over lower case
        let idx = NCHRS - i - 1;
        if inarr[idx] != 0 {
            arr[inarr[idx] as usize] = idx as u8;
        }
        i += 1;
    }
    arr
}

/*
Precomputed mappings between symbols and bit sets
*/

// genome side: only the four concrete bases are non-zero, so an 'N' in the
// genome never satisfies a significant pattern position
const GENOME_2_BIT4: [u8; NCHRS] = apply_lower(makebit4map(false));
const PATTERN_2_BIT4: [u8; NCHRS] = apply_lower(makebit4map(true));
const BIT4_TO_STR: [u8; NCHRS] = invert_chrmap(PATTERN_2_BIT4);

#[inline]
pub fn genome_bits(c: u8) -> u8 {
    GENOME_2_BIT4[c as usize]
}
#[inline]
pub fn pattern_bits(c: u8) -> u8 {
    PATTERN_2_BIT4[c as usize]
}

pub fn is_mixedbase(c: u8) -> bool {
    PATTERN_2_BIT4[c as usize] != 0
}
pub fn is_mixedbase_str(chars: &[u8]) -> bool {
    chars.iter().copied().map(is_mixedbase).all(|x| x)
}
fn complementb4(v: u8) -> u8 {
    // A<->T and C<->G are two bits apart; only operates on the low 4 bits
    ((v << 2) | (v >> 2)) & 0xf
}
pub fn complement_char(c: u8) -> u8 {
    let b4 = PATTERN_2_BIT4[c as usize];
    if b4 == 0 {
        return c;
    }
    // keep the input case
    BIT4_TO_STR[complementb4(b4) as usize] | (c & !0xdf)
}
pub fn reverse_complement_i(out_data: &mut [u8]) {
    for c in out_data.iter_mut() {
        *c = complement_char(*c);
    }
    out_data.reverse();
}
pub fn reverse_complement(data: &[u8]) -> Vec<u8> {
    let mut res: Vec<u8> = data.to_vec();
    reverse_complement_i(&mut res);
    res
}
/// True when the genome base `dna` is one of the bases the pattern symbol `rna` allows.
#[inline]
pub fn cmp_chars(dna: u8, rna: u8) -> bool {
    (genome_bits(dna) & pattern_bits(rna)) != 0
}

#[cfg(test)]
mod tests {
    // Note this useful idiom: importing names from outer (for mod tests) scope.
    use super::*;

    #[test]
    fn test_reverse_complement_char() {
        let input = b"AGRVN";
        let expected_out = b"NBYCT";
        assert_eq!(expected_out, &reverse_complement(input)[..]);
        assert_eq!(input, &reverse_complement(expected_out)[..]);
    }
    #[test]
    fn test_reverse_complement_char_simple() {
        let input = b"NC";
        let expected_out = b"GN";
        assert_eq!(expected_out, &reverse_complement(input)[..]);
        assert_eq!(input, &reverse_complement(expected_out)[..]);
    }
    #[test]
    fn test_complement_pairs() {
        let pairs = [
            (b'A', b'T'),
            (b'G', b'C'),
            (b'R', b'Y'),
            (b'M', b'K'),
            (b'H', b'D'),
            (b'B', b'V'),
        ];
        for (x, y) in pairs {
            assert_eq!(complement_char(x), y);
            assert_eq!(complement_char(y), x);
        }
        for c in *b"NSW" {
            assert_eq!(complement_char(c), c);
        }
    }
    #[test]
    fn test_complement_keeps_case_and_unknowns() {
        assert_eq!(complement_char(b'a'), b't');
        assert_eq!(complement_char(b'r'), b'y');
        assert_eq!(complement_char(b'-'), b'-');
        assert_eq!(complement_char(b'Z'), b'Z');
    }
    #[test]
    fn test_reverse_complement_involution() {
        let input = b"ATGCRYMKHDBVNSWacgtn";
        assert_eq!(&reverse_complement(&reverse_complement(input))[..], &input[..]);
    }
    #[test]
    fn test_is_mixedbase() {
        let input = b"ACbyNnz3?T";
        let expected_out = [
            true, true, true, true, true, true, false, false, false, true,
        ];
        let actual_out = input.map(is_mixedbase);
        assert_eq!(expected_out, actual_out);
    }
    #[test]
    fn test_cmp_chars() {
        assert!(cmp_chars(b'A', b'R'));
        assert!(cmp_chars(b'G', b'R'));
        assert!(!cmp_chars(b'C', b'R'));
        assert!(cmp_chars(b'T', b'N'));
        assert!(!cmp_chars(b'N', b'A'));
        assert!(!cmp_chars(b'N', b'N'));
        assert!(cmp_chars(b'c', b'V'));
        assert!(!cmp_chars(b'T', b'V'));
    }
}
