use crate::bit4ops::cdiv;
use crate::error::{Result, SearchError};
use crate::genome::GenomeBuffer;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const TWOBIT_SIGNATURE: u32 = 0x1A412743;
const NUCL_PER_BYTE: usize = 4;
// 2 bit codes, most significant pair first
const BIT2_TO_CHR: [u8; 4] = [b'T', b'C', b'A', b'G'];

struct TwoBitReader<R> {
    reader: R,
    swapped: bool,
}

impl<R: Read + Seek> TwoBitReader<R> {
    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0_u8; 4];
        self.reader.read_exact(&mut buf)?;
        Ok(if self.swapped {
            u32::from_be_bytes(buf)
        } else {
            u32::from_le_bytes(buf)
        })
    }
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0_u8; 1];
        self.reader.read_exact(&mut buf)?;
        Ok(buf[0])
    }
    fn read_str(&mut self, n_bytes: usize) -> Result<String> {
        let mut str_buf = vec![0_u8; n_bytes];
        self.reader.read_exact(&mut str_buf)?;
        Ok(String::from_utf8(str_buf)?)
    }
    fn read_intvec(&mut self, n_els: usize) -> Result<Vec<u32>> {
        let mut int_buf = Vec::with_capacity(n_els);
        for _ in 0..n_els {
            int_buf.push(self.read_u32()?);
        }
        Ok(int_buf)
    }
    fn read_sequence(&mut self, offset: u32) -> Result<Vec<u8>> {
        self.reader.seek(SeekFrom::Start(offset as u64))?;
        let chrlen = self.read_u32()? as usize;
        let nblockcnt = self.read_u32()? as usize;
        let nblockstarts = self.read_intvec(nblockcnt)?;
        let nblocksizes = self.read_intvec(nblockcnt)?;
        let maskblockcnt = self.read_u32()? as i64;
        // skip mask infos and the reserved word, masking is dropped by upper-casing anyway
        self.reader.seek(SeekFrom::Current(maskblockcnt * 8 + 4))?;

        let mut packed = vec![0_u8; cdiv(chrlen, NUCL_PER_BYTE)];
        self.reader.read_exact(&mut packed)?;
        let mut seq: Vec<u8> = Vec::with_capacity(packed.len() * NUCL_PER_BYTE);
        for byte in packed.iter() {
            for j in 0..NUCL_PER_BYTE {
                let bit2val = (byte >> ((NUCL_PER_BYTE - j - 1) * 2)) & 0x3;
                seq.push(BIT2_TO_CHR[bit2val as usize]);
            }
        }
        seq.truncate(chrlen);
        for (start, size) in nblockstarts.iter().zip(nblocksizes.iter()) {
            let start = *start as usize;
            let end = std::cmp::min(start + *size as usize, chrlen);
            if start < end {
                seq[start..end].fill(b'N');
            }
        }
        Ok(seq)
    }
}

pub fn read_2bit_from<R: Read + Seek>(genome: &mut GenomeBuffer, reader: R) -> Result<()> {
    let mut tb = TwoBitReader {
        reader,
        swapped: false,
    };
    let headerval = tb.read_u32()?;
    if headerval == TWOBIT_SIGNATURE.swap_bytes() {
        tb.swapped = true;
    } else if headerval != TWOBIT_SIGNATURE {
        return Err(SearchError::BadFileFormat(".2bit file badly formatted header"));
    }
    let version_num = tb.read_u32()?;
    if version_num != 0 {
        return Err(SearchError::BadFileFormat(
            "only supports version 0 of .2bit format",
        ));
    }
    let chrcnt = tb.read_u32()?;
    tb.read_u32()?; // reserved

    let mut index: Vec<(String, u32)> = Vec::with_capacity(chrcnt as usize);
    for _ in 0..chrcnt {
        let len_chrname = tb.read_u8()?;
        let chromname = tb.read_str(len_chrname as usize)?;
        let offset = tb.read_u32()?;
        index.push((chromname, offset));
    }
    for (chrname, offset) in index.iter() {
        let seq = tb.read_sequence(*offset)?;
        genome.push_chromosome(chrname, &seq)?;
    }
    Ok(())
}

pub fn read_2bit(genome: &mut GenomeBuffer, fname: &Path) -> Result<()> {
    let file = File::open(fname)?;
    read_2bit_from(genome, BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    // one record "chrA" = TCAGGA with the middle two bases N-masked
    fn small_2bit() -> Vec<u8> {
        let mut buf = Vec::new();
        push_u32(&mut buf, TWOBIT_SIGNATURE);
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 1);
        push_u32(&mut buf, 0);
        buf.push(4);
        buf.extend_from_slice(b"chrA");
        let record_offset = (buf.len() + 4) as u32;
        push_u32(&mut buf, record_offset);
        push_u32(&mut buf, 6); // dna size
        push_u32(&mut buf, 1); // n blocks
        push_u32(&mut buf, 2);
        push_u32(&mut buf, 2);
        push_u32(&mut buf, 0); // mask blocks
        push_u32(&mut buf, 0); // reserved
        // T C A G | G A - -
        buf.push(0b00_01_10_11);
        buf.push(0b11_10_00_00);
        buf
    }

    #[test]
    fn test_read_2bit_decodes_and_masks() {
        let mut genome = GenomeBuffer::new();
        read_2bit_from(&mut genome, Cursor::new(small_2bit())).unwrap();
        assert_eq!(genome.data(), b"TCNNGA");
        assert_eq!(genome.chromosomes()[0].name, "chrA");
    }
    #[test]
    fn test_read_2bit_bad_header() {
        let mut data = small_2bit();
        data[0] = 0;
        let mut genome = GenomeBuffer::new();
        let res = read_2bit_from(&mut genome, Cursor::new(data));
        assert!(matches!(res, Err(SearchError::BadFileFormat(_))));
    }
}
