/// Entry point names in [`KERNEL_CONTENTS`].
pub const FINDER_KERNEL: &str = "finder";
pub const COMPARER_KERNEL: &str = "comparer";

pub const KERNEL_CONTENTS: &str = "

#pragma OPENCL EXTENSION cl_khr_global_int32_base_atomics : enable

#define FLAG_FORWARD 1
#define FLAG_REVERSE 2
// marks the end of a significant position list
#define SIGNIFICANT_END -1

// T=1 C=2 A=4 G=8, genome side: anything but a concrete base is empty
inline uchar genome_bits(char c)
{
    switch (c) {
    case 'T': return 1;
    case 'C': return 2;
    case 'A': return 4;
    case 'G': return 8;
    default: return 0;
    }
}

inline uchar pattern_bits(char c)
{
    switch (c) {
    case 'T': return 1;
    case 'C': return 2;
    case 'A': return 4;
    case 'G': return 8;
    case 'R': return 4 | 8;
    case 'Y': return 2 | 1;
    case 'S': return 8 | 2;
    case 'W': return 4 | 1;
    case 'K': return 8 | 1;
    case 'M': return 4 | 2;
    case 'B': return 2 | 8 | 1;
    case 'D': return 4 | 8 | 1;
    case 'H': return 4 | 2 | 1;
    case 'V': return 4 | 2 | 8;
    case 'N': return 15;
    default: return 0;
    }
}

inline int compatible(char g, char p)
{
    return (genome_bits(g) & pattern_bits(p)) != 0;
}

// a fully significant half has no SIGNIFICANT_END, len bounds the walk
inline int matches_half(__global const char *chr, __local const char *pat, __local const int *index, uint len)
{
    for (uint j = 0; j < len && index[j] != SIGNIFICANT_END; j++) {
        int k = index[j];
        if (!compatible(chr[k], pat[k]))
            return 0;
    }
    return 1;
}

inline ushort count_mismatches(__global const char *chr, __local const char *comp, __local const int *index, uint len, ushort threshold)
{
    ushort mismatches = 0;
    for (uint j = 0; j < len && index[j] != SIGNIFICANT_END; j++) {
        int k = index[j];
        if (!compatible(chr[k], comp[k])) {
            mismatches = add_sat(mismatches, (ushort)1);
            if (mismatches > threshold)
                break;
        }
    }
    return mismatches;
}

// pattern and index hold the forward half then the reverse complement half,
// each index half padded with SIGNIFICANT_END to patternlen entries
__kernel void finder(__global const char *chr,
                     __global const char *pat,
                     __global const int *pat_index,
                     const uint patternlen,
                     __global uchar *flags,
                     __global uint *entrycount,
                     __global uint *loci,
                     __local char *l_pat,
                     __local int *l_pat_index)
{
    size_t i = get_global_id(0);
    for (size_t j = get_local_id(0); j < patternlen * 2; j += get_local_size(0)) {
        l_pat[j] = pat[j];
        l_pat_index[j] = pat_index[j];
    }
    barrier(CLK_LOCAL_MEM_FENCE);

    uchar flag = 0;
    if (matches_half(chr + i, l_pat, l_pat_index, patternlen))
        flag |= FLAG_FORWARD;
    if (matches_half(chr + i, l_pat + patternlen, l_pat_index + patternlen, patternlen))
        flag |= FLAG_REVERSE;
    if (flag) {
        uint idx = atomic_inc(entrycount);
        flags[idx] = flag;
        loci[idx] = (uint)i;
    }
}

__kernel void comparer(__global const char *chr,
                       __global const uint *loci,
                       __global uint *mm_loci,
                       __global const char *comp,
                       __global const int *comp_index,
                       const uint patternlen,
                       const ushort threshold,
                       __global const uchar *flags,
                       __global ushort *mm_count,
                       __global char *direction,
                       __global uint *entrycount,
                       __local char *l_comp,
                       __local int *l_comp_index)
{
    size_t i = get_global_id(0);
    for (size_t j = get_local_id(0); j < patternlen * 2; j += get_local_size(0)) {
        l_comp[j] = comp[j];
        l_comp_index[j] = comp_index[j];
    }
    barrier(CLK_LOCAL_MEM_FENCE);

    uint locus = loci[i];
    ushort mismatches;
    if (flags[i] & FLAG_FORWARD) {
        mismatches = count_mismatches(chr + locus, l_comp, l_comp_index, patternlen, threshold);
        if (mismatches <= threshold) {
            uint idx = atomic_inc(entrycount);
            mm_loci[idx] = locus;
            mm_count[idx] = mismatches;
            direction[idx] = '+';
        }
    }
    if (flags[i] & FLAG_REVERSE) {
        mismatches = count_mismatches(chr + locus, l_comp + patternlen, l_comp_index + patternlen, patternlen, threshold);
        if (mismatches <= threshold) {
            uint idx = atomic_inc(entrycount);
            mm_loci[idx] = locus;
            mm_count[idx] = mismatches;
            direction[idx] = '-';
        }
    }
}

";
